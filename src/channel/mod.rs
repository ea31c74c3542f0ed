//! Broadcast endpoints: a named, same-origin, multi-subscriber pub/sub
//! primitive. The sync engine only ever talks to the traits here; the
//! bundled in-process implementation lives in [`local`].

pub mod local;

pub use local::{LocalEndpoint, LocalHub, UnsupportedEnvironment};

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// One delivered message. `data` is `None` when the sender posted nothing usable.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
	pub data: Option<Value>,
}

impl MessageEvent {
	pub fn new(data: Value) -> Self {
		Self { data: Some(data) }
	}

	pub fn empty() -> Self {
		Self { data: None }
	}
}

/// Handle returned by [`BroadcastEndpoint::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub type Listener = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ChannelError {
	#[error("broadcast channels are not available in this environment")]
	Unavailable,
	#[error("channel '{0}' is closed")]
	Closed(String),
}

/// An open endpoint on a named channel.
///
/// Messages posted here reach every other endpoint on the same channel name,
/// never the poster itself.
pub trait BroadcastEndpoint: Send + Sync {
	fn name(&self) -> &str;

	fn post_message(&self, message: Value) -> Result<(), ChannelError>;

	fn add_listener(&self, listener: Listener) -> ListenerId;

	/// Returns false when the id was not registered.
	fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Opens endpoints. Failing here means the environment cannot do
/// cross-context messaging at all.
pub trait ChannelFactory {
	fn open(&self, name: &str) -> Result<Arc<dyn BroadcastEndpoint>, ChannelError>;
}
