use chrono::{NaiveDate, NaiveTime, Timelike};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use std::sync::Arc;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, ConflictReport, ConflictingInterval, AppointmentError};

/// Minutes elapsed since midnight on the clinic-local clock. All overlap
/// arithmetic happens in this unit.
pub fn minutes_since_midnight(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Half-open interval test: `[s1, e1)` overlaps `[s2, e2)` exactly when
/// start1 < end2 AND start2 < end1. Touching endpoints do not overlap, so
/// back-to-back appointments are fine.
pub fn intervals_overlap(start1: u32, end1: u32, start2: u32, end2: u32) -> bool {
    start1 < end2 && start2 < end1
}

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Check whether a provider already has an appointment overlapping the
    /// given window on the given date. Returns the first committed interval
    /// that collides, in start-time order, so the caller can report it.
    pub async fn check_conflicts(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictReport, AppointmentError> {
        debug!("Checking conflicts for provider {} on {} from {} to {}",
               provider_id, date, start_time, end_time);

        let existing_appointments = self.get_provider_appointments_for_date(
            provider_id,
            date,
            exclude_appointment_id,
            auth_token,
        ).await?;

        let candidate_start = minutes_since_midnight(start_time);
        let candidate_end = minutes_since_midnight(end_time);

        // Rows arrive in start-time order; the first overlap is the one
        // we report.
        for appointment in existing_appointments {
            let existing_start = minutes_since_midnight(appointment.start_time);
            let existing_end = minutes_since_midnight(appointment.end_time);

            if intervals_overlap(candidate_start, candidate_end, existing_start, existing_end) {
                warn!("Conflict detected for provider {} on {}: requested {}-{} overlaps appointment {} ({}-{})",
                      provider_id, date, start_time, end_time,
                      appointment.id, appointment.start_time, appointment.end_time);

                return Ok(ConflictReport::collision(ConflictingInterval {
                    appointment_id: appointment.id,
                    start_time: appointment.start_time,
                    end_time: appointment.end_time,
                }));
            }
        }

        Ok(ConflictReport::clear())
    }

    async fn get_provider_appointments_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        // Cancelled appointments release their slot; every other status
        // still blocks it.
        let mut query_parts = vec![
            format!("provider_id=eq.{}", provider_id),
            format!("date=eq.{}", date),
            "status=neq.cancelled".to_string(),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!("/rest/v1/appointments?{}&order=start_time.asc",
                          query_parts.join("&"));

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        Ok(appointments)
    }
}
