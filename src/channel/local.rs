use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, trace, warn};
use serde_json::Value;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use super::{BroadcastEndpoint, ChannelError, ChannelFactory, Listener, ListenerId, MessageEvent};

/// Upper bound on pump rounds in [`LocalHub::flush`]; two tabs that keep
/// answering each other would otherwise never settle.
const MAX_FLUSH_ROUNDS: usize = 1024;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
	m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct HubInner {
	channels: HashMap<String, Vec<Weak<LocalEndpoint>>>,
	next_endpoint: u64,
}

impl HubInner {
	/// Live endpoints on `name`, pruning the ones that were dropped.
	fn live(&mut self, name: &str) -> Vec<Arc<LocalEndpoint>> {
		let Some(slots) = self.channels.get_mut(name) else {
			return Vec::new();
		};
		slots.retain(|w| w.strong_count() > 0);
		slots.iter().filter_map(Weak::upgrade).collect()
	}
}

/// In-process stand-in for a browser's broadcast channel registry.
///
/// Every endpoint opened through the same hub with the same name sees the
/// messages the others post. Delivery is deferred: a post only queues the
/// message in each peer's inbox; it is handed to listeners when that peer is
/// pumped (see [`LocalEndpoint::pump`], [`LocalHub::flush`]) or by the async
/// driver started with [`LocalEndpoint::spawn`].
#[derive(Clone, Default)]
pub struct LocalHub {
	inner: Arc<Mutex<HubInner>>,
}

impl LocalHub {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn open_local(&self, name: &str) -> Arc<LocalEndpoint> {
		let mut inner = lock(&self.inner);
		inner.next_endpoint += 1;
		let endpoint = Arc::new(LocalEndpoint::new(
			inner.next_endpoint,
			name.to_string(),
			Arc::downgrade(&self.inner),
		));
		inner
			.channels
			.entry(name.to_string())
			.or_default()
			.push(Arc::downgrade(&endpoint));
		debug!("Opened local endpoint #{} on channel '{}'", endpoint.id, name);
		endpoint
	}

	/// Open endpoints on `name` that have not been dropped.
	pub fn endpoints(&self, name: &str) -> Vec<Arc<LocalEndpoint>> {
		lock(&self.inner).live(name)
	}

	/// Close every endpoint on `name`; later posts on them fail.
	pub fn close_channel(&self, name: &str) {
		for endpoint in self.endpoints(name) {
			endpoint.close();
		}
	}

	/// Pump every endpoint until no inbox holds a message.
	///
	/// Returns the number of messages delivered.
	pub fn flush(&self) -> usize {
		let mut delivered = 0;
		for _ in 0..MAX_FLUSH_ROUNDS {
			let endpoints: Vec<Arc<LocalEndpoint>> = {
				let mut inner = lock(&self.inner);
				let names: Vec<String> = inner.channels.keys().cloned().collect();
				let live: Vec<Arc<LocalEndpoint>> =
					names.iter().flat_map(|n| inner.live(n)).collect();
				live
			};

			let round: usize = endpoints.iter().map(|e| e.pump()).sum();
			if round == 0 {
				return delivered;
			}
			delivered += round;
		}
		warn!(
			"Local hub did not settle after {} rounds ({} messages delivered)",
			MAX_FLUSH_ROUNDS, delivered
		);
		delivered
	}
}

impl ChannelFactory for LocalHub {
	fn open(&self, name: &str) -> Result<Arc<dyn BroadcastEndpoint>, ChannelError> {
		let endpoint: Arc<dyn BroadcastEndpoint> = self.open_local(name);
		Ok(endpoint)
	}
}

/// Factory for an environment without broadcast support; every open fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedEnvironment;

impl ChannelFactory for UnsupportedEnvironment {
	fn open(&self, _name: &str) -> Result<Arc<dyn BroadcastEndpoint>, ChannelError> {
		Err(ChannelError::Unavailable)
	}
}

/// One endpoint on a [`LocalHub`] channel.
pub struct LocalEndpoint {
	id: u64,
	name: String,
	hub: Weak<Mutex<HubInner>>,
	closed: AtomicBool,
	shutdown: Notify,
	listeners: Mutex<Vec<(ListenerId, Listener)>>,
	next_listener: AtomicU64,
	inbox_tx: mpsc::UnboundedSender<Value>,
	inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl LocalEndpoint {
	fn new(id: u64, name: String, hub: Weak<Mutex<HubInner>>) -> Self {
		let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
		Self {
			id,
			name,
			hub,
			closed: AtomicBool::new(false),
			shutdown: Notify::new(),
			listeners: Mutex::new(Vec::new()),
			next_listener: AtomicU64::new(0),
			inbox_tx,
			inbox_rx: tokio::sync::Mutex::new(inbox_rx),
		}
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Stop accepting posts and stop the async driver. Queued messages are
	/// discarded by later pumps.
	pub fn close(&self) {
		if !self.closed.swap(true, Ordering::AcqRel) {
			debug!("Closed local endpoint #{} on channel '{}'", self.id, self.name);
			self.shutdown.notify_one();
		}
	}

	pub fn listener_count(&self) -> usize {
		lock(&self.listeners).len()
	}

	/// Deliver everything currently queued for this endpoint.
	///
	/// Returns 0 without delivering if the async driver owns the inbox.
	pub fn pump(&self) -> usize {
		let pending: Vec<Value> = {
			let Ok(mut rx) = self.inbox_rx.try_lock() else {
				return 0;
			};
			let drained: Vec<Value> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
			drained
		};

		if self.is_closed() {
			return 0;
		}

		let count = pending.len();
		for message in pending {
			self.deliver(message);
		}
		count
	}

	/// Deliver messages as they arrive until the endpoint is closed.
	pub async fn run(&self) {
		let mut rx = self.inbox_rx.lock().await;
		while !self.is_closed() {
			tokio::select! {
				biased;
				_ = self.shutdown.notified() => break,
				message = rx.recv() => match message {
					Some(message) => self.deliver(message),
					None => break,
				},
			}
		}
		debug!("Driver for local endpoint #{} stopped", self.id);
	}

	/// Run [`LocalEndpoint::run`] on a tokio task.
	pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
		let endpoint = Arc::clone(self);
		tokio::spawn(async move { endpoint.run().await })
	}

	fn deliver(&self, message: Value) {
		let event = match message {
			Value::Null => MessageEvent::empty(),
			other => MessageEvent::new(other),
		};

		// Snapshot so a listener can remove itself while firing.
		let listeners: Vec<Listener> = lock(&self.listeners)
			.iter()
			.map(|(_, l)| Arc::clone(l))
			.collect();

		trace!(
			"Delivering message to {} listener(s) on endpoint #{}",
			listeners.len(),
			self.id
		);
		for listener in listeners {
			listener(&event);
		}
	}
}

impl BroadcastEndpoint for LocalEndpoint {
	fn name(&self) -> &str {
		&self.name
	}

	fn post_message(&self, message: Value) -> Result<(), ChannelError> {
		if self.is_closed() {
			return Err(ChannelError::Closed(self.name.clone()));
		}
		let Some(hub) = self.hub.upgrade() else {
			return Err(ChannelError::Closed(self.name.clone()));
		};

		let peers = lock(&hub).live(&self.name);
		let mut sent = 0;
		for peer in peers.iter().filter(|p| p.id != self.id && !p.is_closed()) {
			if peer.inbox_tx.send(message.clone()).is_ok() {
				sent += 1;
			}
		}
		trace!(
			"Endpoint #{} posted to {} peer(s) on '{}'",
			self.id, sent, self.name
		);
		Ok(())
	}

	fn add_listener(&self, listener: Listener) -> ListenerId {
		let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
		lock(&self.listeners).push((id, listener));
		id
	}

	fn remove_listener(&self, id: ListenerId) -> bool {
		let mut listeners = lock(&self.listeners);
		let before = listeners.len();
		listeners.retain(|(lid, _)| *lid != id);
		listeners.len() != before
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use serde_json::json;

	fn recorder(endpoint: &LocalEndpoint) -> Arc<Mutex<Vec<MessageEvent>>> {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		endpoint.add_listener(Arc::new(move |e: &MessageEvent| {
			lock(&sink).push(e.clone());
		}));
		seen
	}

	#[test]
	fn posts_reach_peers_but_not_the_sender() {
		let hub = LocalHub::new();
		let a = hub.open_local("room");
		let b = hub.open_local("room");
		let other = hub.open_local("elsewhere");
		let seen_a = recorder(&a);
		let seen_b = recorder(&b);
		let seen_other = recorder(&other);

		a.post_message(json!({"type": "PING"})).unwrap();
		assert!(lock(&seen_b).is_empty(), "delivery must wait for a pump");

		assert_eq!(hub.flush(), 1);
		assert!(lock(&seen_a).is_empty());
		assert!(lock(&seen_other).is_empty());
		assert_eq!(*lock(&seen_b), vec![MessageEvent::new(json!({"type": "PING"}))]);
	}

	#[test]
	fn per_sender_order_is_preserved() {
		let hub = LocalHub::new();
		let a = hub.open_local("room");
		let b = hub.open_local("room");
		let seen = recorder(&b);

		for i in 0..5 {
			a.post_message(json!({"type": "N", "payload": i})).unwrap();
		}
		b.pump();

		let order: Vec<Value> = lock(&seen)
			.iter()
			.map(|e| e.data.as_ref().unwrap()["payload"].clone())
			.collect();
		assert_eq!(order, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
	}

	#[test]
	fn null_messages_arrive_without_data() {
		let hub = LocalHub::new();
		let a = hub.open_local("room");
		let b = hub.open_local("room");
		let seen = recorder(&b);

		a.post_message(Value::Null).unwrap();
		hub.flush();
		assert_eq!(*lock(&seen), vec![MessageEvent::empty()]);
	}

	#[test]
	fn removed_listeners_stop_firing() {
		let hub = LocalHub::new();
		let a = hub.open_local("room");
		let b = hub.open_local("room");
		let id = b.add_listener(Arc::new(|_: &MessageEvent| panic!("removed listener fired")));

		assert!(b.remove_listener(id));
		assert!(!b.remove_listener(id));
		a.post_message(json!({"type": "X"})).unwrap();
		hub.flush();
		assert_eq!(b.listener_count(), 0);
	}

	#[test]
	fn closed_endpoints_reject_posts() {
		let hub = LocalHub::new();
		let a = hub.open_local("room");
		hub.close_channel("room");

		assert!(matches!(
			a.post_message(json!({"type": "X"})),
			Err(ChannelError::Closed(name)) if name == "room"
		));
	}

	#[test]
	fn dropped_endpoints_are_pruned() {
		let hub = LocalHub::new();
		let a = hub.open_local("room");
		drop(hub.open_local("room"));

		assert_eq!(hub.endpoints("room").len(), 1);
		a.post_message(json!({"type": "X"})).unwrap();
	}

	#[test]
	fn unsupported_environment_never_opens() {
		assert!(matches!(
			UnsupportedEnvironment.open("room"),
			Err(ChannelError::Unavailable)
		));
	}

	#[tokio::test]
	async fn async_driver_delivers_until_closed() {
		let hub = LocalHub::new();
		let a = hub.open_local("room");
		let b = hub.open_local("room");
		let (tx, mut rx) = mpsc::unbounded_channel();
		b.add_listener(Arc::new(move |e: &MessageEvent| {
			let _ = tx.send(e.clone());
		}));

		let driver = b.spawn();
		a.post_message(json!({"type": "LIVE"})).unwrap();

		let event = rx.recv().await.unwrap();
		assert_eq!(event, MessageEvent::new(json!({"type": "LIVE"})));

		b.close();
		driver.await.unwrap();
	}
}
