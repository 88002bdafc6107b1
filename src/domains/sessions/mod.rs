pub mod db_sessions;
pub mod discovery;
pub mod entity;
pub mod events;
mod live;
pub mod preview;
pub mod repository;
pub mod service;
pub mod utils;

pub use discovery::{DiscoveryConfig, DiscoveryRequest, DiscoveryScheduler};
pub use entity::{
    AutoApprovalUpdate, CreateSessionParams, NewSessionRecord, SessionIntent, SessionQuery,
    SessionRecord, SessionSummary, TdSessionLookup,
};
pub use events::SessionEvent;
pub use repository::SessionRecordStore;
pub use service::{DestroyAllReport, SessionManager, SessionManagerDeps};
