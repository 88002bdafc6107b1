pub mod connection;
pub mod db_schema;
pub mod timestamps;

pub use connection::{Database, default_database_path, is_corruption_error};
pub use db_schema::{SCHEMA_VERSION, initialize_schema};
