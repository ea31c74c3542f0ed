use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, error, info, warn};

use crate::channel::{BroadcastEndpoint, ChannelFactory, Listener, ListenerId, MessageEvent};
use crate::store::Store;
use crate::sync::action::{Action, GET_INIT_STATE, RECEIVE_INIT_STATE};
use crate::sync::error::SyncError;
use crate::sync::identity::TabId;
use crate::sync::metrics::SyncMetrics;
use crate::sync::options::SyncConfig;
use crate::sync::policy::AllowPolicy;

/// Progress of the one-shot initial-state handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
	/// Listening for the first snapshot from a peer
	Waiting,
	/// A snapshot was dispatched and the listener removed
	Satisfied,
	/// The engine was closed before any peer answered
	AbandonedOnTeardown,
}

struct Handshake {
	state: HandshakeState,
	listener: Option<ListenerId>,
}

/// Moves actions between the local store and peer tabs.
///
/// One engine per tab. It owns the channel endpoint for its whole lifetime
/// and registers two listeners on it: the steady-state handler
/// ([`SyncEngine::on_incoming`]) and, when `init_state` is set, a temporary
/// handshake listener that applies the first snapshot a peer sends back.
pub struct SyncEngine {
	config: SyncConfig,
	tab_id: TabId,
	policy: AllowPolicy,
	channel: Arc<dyn BroadcastEndpoint>,
	store: Weak<dyn Store>,
	steady_listener: ListenerId,
	handshake: Mutex<Option<Handshake>>,
	metrics: Arc<SyncMetrics>,
}

impl SyncEngine {
	/// Open the channel and start listening.
	///
	/// The engine keeps only a weak reference to `store` so the store may
	/// own the middleware that owns this engine.
	pub fn new<S: Store + 'static>(
		config: SyncConfig,
		factory: &dyn ChannelFactory,
		store: &Arc<S>,
	) -> Result<Arc<Self>, SyncError> {
		let channel = factory.open(&config.channel_name).map_err(|e| {
			error!("Cannot open channel '{}': {}", config.channel_name, e);
			SyncError::Unsupported(e)
		})?;
		let policy = AllowPolicy::from_config(&config);
		let store: Weak<S> = Arc::downgrade(store);
		let store: Weak<dyn Store> = store;

		let engine = Arc::new_cyclic(|weak: &Weak<SyncEngine>| {
			let steady_listener = channel.add_listener(steady_listener(weak.clone()));
			let handshake = config.init_state.then(|| Handshake {
				state: HandshakeState::Waiting,
				listener: Some(channel.add_listener(handshake_listener(weak.clone()))),
			});

			SyncEngine {
				config,
				tab_id: TabId::generate(),
				policy,
				channel,
				store,
				steady_listener,
				handshake: Mutex::new(handshake),
				metrics: Arc::new(SyncMetrics::default()),
			}
		});

		info!(
			"Sync engine {} joined channel '{}' (policy: {}, init_state: {})",
			engine.tab_id,
			engine.config.channel_name,
			engine.policy.name(),
			engine.config.init_state
		);
		Ok(engine)
	}

	pub fn tab_id(&self) -> &TabId {
		&self.tab_id
	}

	pub fn channel_name(&self) -> &str {
		&self.config.channel_name
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	pub fn policy(&self) -> &AllowPolicy {
		&self.policy
	}

	pub fn metrics(&self) -> Arc<SyncMetrics> {
		Arc::clone(&self.metrics)
	}

	/// `None` when the engine was built without `init_state`.
	pub fn handshake_state(&self) -> Option<HandshakeState> {
		self.handshake_guard().as_ref().map(|h| h.state)
	}

	/// Copy of `action` tagged with this tab's identity.
	pub fn stamp(&self, action: &Action) -> Action {
		action.stamped(self.tab_id.as_str())
	}

	/// Broadcast `action` to peer tabs.
	///
	/// Actions the policy rejects are dropped silently, except the two
	/// handshake markers which are always sent.
	pub fn emit(&self, action: &Action) -> Result<(), SyncError> {
		let stamped = self.stamp(action);

		if !(self.policy.allows(&stamped) || stamped.is_control()) {
			debug!("Not broadcasting '{}': rejected by {}", stamped.kind, self.policy.name());
			SyncMetrics::incr(&self.metrics.actions_filtered);
			return Ok(());
		}

		let message = stamped.to_value()?;
		self.channel.post_message(message).map_err(|e| {
			error!("Broadcast of '{}' failed: {}", stamped.kind, e);
			SyncError::Unsupported(e)
		})?;

		SyncMetrics::incr(&self.metrics.actions_emitted);
		debug!("Broadcast '{}' from {}", stamped.kind, self.tab_id);
		Ok(())
	}

	/// Steady-state handling of one message from a peer.
	pub fn on_incoming(&self, event: &MessageEvent) -> Result<(), SyncError> {
		let Some(data) = &event.data else {
			SyncMetrics::incr(&self.metrics.messages_ignored);
			return Ok(());
		};
		SyncMetrics::incr(&self.metrics.messages_received);

		let Some(action) = Action::from_value(data) else {
			debug!("Ignoring message without an action type on '{}'", self.channel_name());
			SyncMetrics::incr(&self.metrics.messages_ignored);
			return Ok(());
		};

		match action.kind.as_str() {
			// Only the handshake listener consumes snapshots.
			RECEIVE_INIT_STATE => Ok(()),
			GET_INIT_STATE => self.serve_init_state(&action),
			_ => {
				if self.policy.allows(&action) {
					self.dispatch_local(action.with_sync_flag(true));
				} else {
					debug!(
						"Dropping incoming '{}': rejected by {}",
						action.kind,
						self.policy.name()
					);
				}
				Ok(())
			}
		}
	}

	fn serve_init_state(&self, request: &Action) -> Result<(), SyncError> {
		let Some(store) = self.store.upgrade() else {
			warn!("Init state requested but the local store is gone");
			return Ok(());
		};

		let snapshot = (self.config.prepare_state)(store.get_state());
		self.emit(&Action::new(RECEIVE_INIT_STATE).with_payload(snapshot))?;

		SyncMetrics::incr(&self.metrics.init_state_served);
		debug!(
			"Served init state to {}",
			request.wuid.as_deref().unwrap_or("unknown tab")
		);
		Ok(())
	}

	fn on_handshake_message(&self, event: &MessageEvent) {
		let Some(action) = event.data.as_ref().and_then(Action::from_value) else {
			return;
		};
		if action.kind != RECEIVE_INIT_STATE {
			return;
		}

		let Some(store) = self.store.upgrade() else {
			warn!("Local store is gone; discarding init state snapshot");
			return;
		};

		let listener = {
			let mut guard = self.handshake_guard();
			match guard.as_mut() {
				Some(h) if h.state == HandshakeState::Waiting => {
					h.state = HandshakeState::Satisfied;
					h.listener.take()
				}
				_ => return,
			}
		};
		if let Some(id) = listener {
			self.channel.remove_listener(id);
		}

		info!(
			"Applying init state from {}",
			action.wuid.as_deref().unwrap_or("unknown tab")
		);
		store.dispatch(action.with_sync_flag(true));
		SyncMetrics::incr(&self.metrics.actions_dispatched);
		SyncMetrics::incr(&self.metrics.init_state_applied);
	}

	fn dispatch_local(&self, action: Action) {
		match self.store.upgrade() {
			Some(store) => {
				store.dispatch(action);
				SyncMetrics::incr(&self.metrics.actions_dispatched);
			}
			None => warn!("Local store is gone; discarding synced '{}'", action.kind),
		}
	}

	/// Leave the channel: remove both listeners and give up on a pending
	/// handshake. Dropping the engine does the same.
	pub fn close(&self) {
		self.channel.remove_listener(self.steady_listener);

		let mut guard = self.handshake_guard();
		if let Some(h) = guard.as_mut() {
			if h.state == HandshakeState::Waiting {
				h.state = HandshakeState::AbandonedOnTeardown;
				debug!("Init state handshake abandoned by {}", self.tab_id);
			}
			if let Some(id) = h.listener.take() {
				self.channel.remove_listener(id);
			}
		}
	}

	fn handshake_guard(&self) -> MutexGuard<'_, Option<Handshake>> {
		self.handshake.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl Drop for SyncEngine {
	fn drop(&mut self) {
		self.close();
	}
}

fn steady_listener(engine: Weak<SyncEngine>) -> Listener {
	Arc::new(move |event: &MessageEvent| {
		if let Some(engine) = engine.upgrade() {
			if let Err(e) = engine.on_incoming(event) {
				error!("Failed to handle message on '{}': {}", engine.channel_name(), e);
			}
		}
	})
}

fn handshake_listener(engine: Weak<SyncEngine>) -> Listener {
	Arc::new(move |event: &MessageEvent| {
		if let Some(engine) = engine.upgrade() {
			engine.on_handshake_message(event);
		}
	})
}
