/// Common helpers for the multi-tab integration tests.
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tabsync::channel::LocalHub;
use tabsync::store::ReducerStore;
use tabsync::sync::{Action, SyncConfig, SyncMiddleware};

/// A tab: a counter store with the sync middleware attached, plus every
/// action its reducer saw.
pub struct TestTab {
	pub store: Arc<ReducerStore>,
	pub seen: Arc<Mutex<Vec<Action>>>,
}

#[allow(dead_code)]
impl TestTab {
	pub fn open(hub: &LocalHub, config: SyncConfig) -> Self {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let log = Arc::clone(&seen);
		let store = ReducerStore::new(json!({"count": 0}), move |state: &Value, action: &Action| {
			log.lock().unwrap().push(action.clone());
			counter(state, action)
		});
		let middleware = SyncMiddleware::new(config, hub, &store).expect("middleware should build");
		assert!(store.attach(middleware).is_ok());
		Self { store, seen }
	}

	pub fn middleware(&self) -> &SyncMiddleware {
		self.store.middleware().expect("middleware attached")
	}

	pub fn dispatch(&self, kind: &str) {
		self.store
			.try_dispatch(Action::new(kind))
			.expect("dispatch should succeed");
	}

	pub fn count(&self) -> i64 {
		use tabsync::store::Store;
		self.store.get_state()["count"].as_i64().unwrap_or(0)
	}

	pub fn seen(&self) -> Vec<Action> {
		self.seen.lock().unwrap().clone()
	}
}

pub fn counter(state: &Value, action: &Action) -> Value {
	let count = state["count"].as_i64().unwrap_or(0);
	match action.kind.as_str() {
		"INCREMENT" => json!({"count": count + 1}),
		"DECREMENT" => json!({"count": count - 1}),
		_ => state.clone(),
	}
}
