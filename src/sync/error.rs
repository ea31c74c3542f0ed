use thiserror::Error;

use crate::channel::ChannelError;

/// Fixed text reported whenever cross-context messaging is unavailable.
pub const UNSUPPORTED_MESSAGE: &str = "Your environment doesn't support cross tab communication.";

#[derive(Debug, Error)]
pub enum SyncError {
	/// The broadcast primitive could not be opened or refused a post.
	/// Not retried; the engine is unusable afterwards.
	#[error("{}", UNSUPPORTED_MESSAGE)]
	Unsupported(#[source] ChannelError),
	#[error("failed to encode action: {0}")]
	Encode(#[from] serde_json::Error),
}
