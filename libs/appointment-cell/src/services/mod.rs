pub mod conflict;
pub mod lifecycle;
pub mod scheduling;
pub mod slots;

pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleService;
pub use scheduling::AppointmentSchedulingService;
pub use slots::ProviderSlotLocks;
