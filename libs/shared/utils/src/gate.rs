use std::fmt;

use async_trait::async_trait;

use shared_models::auth::User;
use shared_models::error::AppError;

/// Actions that mutate clinic state and therefore pass through the permission
/// gate before any record is touched. Read endpoints rely on authentication
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    ProcessBookingRequest,
    ManageAppointments,
    RegisterPatients,
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GateAction::ProcessBookingRequest => "process booking requests",
            GateAction::ManageAppointments => "manage appointments",
            GateAction::RegisterPatients => "register patients",
        };
        write!(f, "{}", label)
    }
}

/// The single capability check the write paths consult. Injected so routers
/// can swap the policy without touching orchestration code.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn authorize(&self, user: &User, action: GateAction) -> Result<(), AppError>;
}

/// Role-matrix policy used in production. Staff roles come from the JWT
/// `role` claim.
pub struct RolePermissionGate;

#[async_trait]
impl PermissionGate for RolePermissionGate {
    async fn authorize(&self, user: &User, action: GateAction) -> Result<(), AppError> {
        let role = user.role.as_deref().unwrap_or("");

        let allowed = match action {
            GateAction::ProcessBookingRequest => {
                matches!(role, "receptionist" | "admin")
            }
            GateAction::ManageAppointments => {
                matches!(role, "receptionist" | "doctor" | "admin")
            }
            GateAction::RegisterPatients => {
                matches!(role, "receptionist" | "admin")
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role '{}' is not permitted to {}",
                role, action
            )))
        }
    }
}
