pub mod domains;
pub mod errors;
pub mod infrastructure;
pub mod services;
pub mod shared;
pub mod utils;

pub use errors::OrchestratorError;
pub use services::SessionOrchestrator;
