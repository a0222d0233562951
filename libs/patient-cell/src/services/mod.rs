pub mod identity;
pub mod patient;
pub mod registration;

pub use identity::PatientIdAllocator;
pub use patient::PatientService;
pub use registration::PatientRegistrationService;
