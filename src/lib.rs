//! Keeps copies of a predictable-state container converged across tabs.
//!
//! Every action a tab dispatches locally is stamped with the tab's identity
//! and broadcast on a named channel; peers dispatch what their allow policy
//! accepts. A tab that starts with `init_state` asks its peers for a state
//! snapshot and applies the first one that comes back.

pub mod channel;
pub mod config;
pub mod observability;
pub mod simulate;
pub mod store;
pub mod sync;

pub use channel::{BroadcastEndpoint, ChannelFactory, LocalHub, MessageEvent};
pub use store::{ReducerStore, Store};
pub use sync::{Action, SyncConfig, SyncEngine, SyncError, SyncMiddleware};
