pub mod env_adapter;
pub mod path_utils;

pub use env_adapter::EnvAdapter;
pub use path_utils::{normalize_project_path, safe_canonicalize};
