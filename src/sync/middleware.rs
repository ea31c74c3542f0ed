use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::channel::ChannelFactory;
use crate::store::Store;
use crate::sync::action::{Action, GET_INIT_STATE, RECEIVE_INIT_STATE};
use crate::sync::engine::SyncEngine;
use crate::sync::error::SyncError;
use crate::sync::options::SyncConfig;

/// Dispatch-pipeline stage that broadcasts local actions and marks
/// everything it forwards with `$isSync`.
///
/// Plug it in front of the reducer: for every dispatched action call
/// [`SyncMiddleware::handle`] with the current state and the next stage.
///
/// ```no_run
/// use serde_json::json;
/// use tabsync::channel::LocalHub;
/// use tabsync::store::ReducerStore;
/// use tabsync::sync::{SyncConfig, SyncMiddleware};
///
/// let hub = LocalHub::new();
/// let store = ReducerStore::new(json!({}), |state, _action| state.clone());
/// let middleware = SyncMiddleware::new(SyncConfig::new().with_init_state(true), &hub, &store)?;
/// let _ = store.attach(middleware);
/// # Ok::<(), tabsync::sync::SyncError>(())
/// ```
pub struct SyncMiddleware {
	engine: Arc<SyncEngine>,
}

impl SyncMiddleware {
	/// Build the engine and, with `init_state`, ask peers for their state.
	pub fn new<S: Store + 'static>(
		config: SyncConfig,
		factory: &dyn ChannelFactory,
		store: &Arc<S>,
	) -> Result<Self, SyncError> {
		let init_state = config.init_state;
		let engine = SyncEngine::new(config, factory, store)?;

		if init_state {
			engine.emit(&Action::new(GET_INIT_STATE))?;
		}

		Ok(Self { engine })
	}

	/// Same as [`SyncMiddleware::new`] with every option at its default.
	pub fn with_defaults<S: Store + 'static>(
		factory: &dyn ChannelFactory,
		store: &Arc<S>,
	) -> Result<Self, SyncError> {
		Self::new(SyncConfig::default(), factory, store)
	}

	pub fn engine(&self) -> &Arc<SyncEngine> {
		&self.engine
	}

	/// Run one action through the middleware.
	///
	/// Only actions without `$wuid` are broadcast; anything carrying one
	/// already came from a peer and must not bounce back. A snapshot action
	/// short-circuits the pipeline and yields its payload as the new state.
	pub fn handle<F>(&self, state: &Value, action: Action, next: F) -> Result<Value, SyncError>
	where
		F: FnOnce(&Value, Action) -> Value,
	{
		if action.wuid.is_none() {
			self.engine.emit(&action)?;
		}

		if action.kind == RECEIVE_INIT_STATE {
			debug!("Replacing state with snapshot from {:?}", action.wuid);
			return Ok(action.payload.unwrap_or(Value::Null));
		}

		Ok(next(state, action.normalized()))
	}
}
