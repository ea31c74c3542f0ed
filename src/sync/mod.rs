pub mod action;
pub mod engine;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod options;
pub mod policy;

pub use action::{Action, GET_INIT_STATE, RECEIVE_INIT_STATE, RESERVED_KEYS};
pub use engine::{HandshakeState, SyncEngine};
pub use error::{SyncError, UNSUPPORTED_MESSAGE};
pub use identity::TabId;
pub use metrics::SyncMetrics;
pub use middleware::SyncMiddleware;
pub use options::{DEFAULT_CHANNEL_NAME, SyncConfig};
pub use policy::AllowPolicy;
