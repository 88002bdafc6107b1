pub mod agents;
pub mod detection;
pub mod sessions;
pub mod settings;
pub mod terminal;
