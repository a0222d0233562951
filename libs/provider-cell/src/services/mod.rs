pub mod assigner;
pub mod directory;

pub use assigner::FallbackAssigner;
pub use directory::ProviderDirectoryService;
