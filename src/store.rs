use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::error;
use serde_json::Value;

use crate::sync::{Action, SyncError, SyncMiddleware};

/// The state container the sync engine feeds remote actions into.
pub trait Store: Send + Sync {
	fn dispatch(&self, action: Action);

	fn get_state(&self) -> Value;
}

pub type Reducer = Arc<dyn Fn(&Value, &Action) -> Value + Send + Sync>;

/// Minimal reducer-driven store with an optional sync middleware in front
/// of the reducer. Dispatches are serialized by the state lock.
pub struct ReducerStore {
	state: Mutex<Value>,
	reducer: Reducer,
	middleware: OnceLock<SyncMiddleware>,
}

impl ReducerStore {
	pub fn new<F>(initial: Value, reducer: F) -> Arc<Self>
	where
		F: Fn(&Value, &Action) -> Value + Send + Sync + 'static,
	{
		Arc::new(Self {
			state: Mutex::new(initial),
			reducer: Arc::new(reducer),
			middleware: OnceLock::new(),
		})
	}

	/// Put `middleware` in front of the reducer. Only the first call wins;
	/// the rejected middleware is handed back.
	pub fn attach(&self, middleware: SyncMiddleware) -> Result<(), SyncMiddleware> {
		self.middleware.set(middleware)
	}

	pub fn middleware(&self) -> Option<&SyncMiddleware> {
		self.middleware.get()
	}

	/// Like [`Store::dispatch`] but hands transport failures back to the caller.
	pub fn try_dispatch(&self, action: Action) -> Result<(), SyncError> {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		let reducer = &self.reducer;
		let next_state = match self.middleware.get() {
			Some(middleware) => middleware.handle(&*state, action, |s, a| reducer(s, &a))?,
			None => reducer(&*state, &action),
		};
		*state = next_state;
		Ok(())
	}
}

impl Store for ReducerStore {
	fn dispatch(&self, action: Action) {
		if let Err(e) = self.try_dispatch(action) {
			error!("Dispatch failed: {}", e);
		}
	}

	fn get_state(&self) -> Value {
		self.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use serde_json::json;

	fn counter(state: &Value, action: &Action) -> Value {
		let count = state["count"].as_i64().unwrap_or(0);
		match action.kind.as_str() {
			"INCREMENT" => json!({"count": count + 1}),
			"DECREMENT" => json!({"count": count - 1}),
			_ => state.clone(),
		}
	}

	#[test]
	fn reducer_runs_without_middleware() {
		let store = ReducerStore::new(json!({"count": 0}), counter);
		store.dispatch(Action::new("INCREMENT"));
		store.dispatch(Action::new("INCREMENT"));
		store.dispatch(Action::new("DECREMENT"));
		store.dispatch(Action::new("UNKNOWN"));

		assert_eq!(store.get_state(), json!({"count": 1}));
		assert!(store.middleware().is_none());
	}
}
