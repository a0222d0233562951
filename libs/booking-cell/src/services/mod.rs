pub mod orchestrator;
pub mod requests;
pub mod saga;

pub use orchestrator::BookingOrchestrator;
pub use requests::BookingRequestService;
pub use saga::CompensationStack;
