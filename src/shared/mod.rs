pub mod cli;
pub mod lifecycle_gate;

pub use lifecycle_gate::LifecycleGate;
