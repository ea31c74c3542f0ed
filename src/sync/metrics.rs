use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one sync engine.
#[derive(Debug, Default)]
pub struct SyncMetrics {
	/// Actions posted to the channel, control markers included
	pub actions_emitted: AtomicU64,
	/// Outgoing actions dropped by the allow policy
	pub actions_filtered: AtomicU64,
	/// Messages seen by the steady-state listener
	pub messages_received: AtomicU64,
	/// Remote actions dispatched into the local store
	pub actions_dispatched: AtomicU64,
	/// Incoming messages that were empty or not an action
	pub messages_ignored: AtomicU64,
	/// Snapshots sent in answer to a peer's request
	pub init_state_served: AtomicU64,
	/// Snapshots received and dispatched by the handshake
	pub init_state_applied: AtomicU64,
}

impl SyncMetrics {
	pub(crate) fn incr(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}

	/// Prometheus text exposition, labelled with the channel name.
	pub fn to_prometheus_text(&self, channel: &str) -> String {
		let counters: [(&str, &str, &AtomicU64); 7] = [
			(
				"tabsync_actions_emitted_total",
				"Actions posted to the broadcast channel",
				&self.actions_emitted,
			),
			(
				"tabsync_actions_filtered_total",
				"Outgoing actions dropped by the allow policy",
				&self.actions_filtered,
			),
			(
				"tabsync_messages_received_total",
				"Messages received from peer tabs",
				&self.messages_received,
			),
			(
				"tabsync_actions_dispatched_total",
				"Remote actions dispatched into the local store",
				&self.actions_dispatched,
			),
			(
				"tabsync_messages_ignored_total",
				"Incoming messages without a usable action",
				&self.messages_ignored,
			),
			(
				"tabsync_init_state_served_total",
				"State snapshots sent to peers",
				&self.init_state_served,
			),
			(
				"tabsync_init_state_applied_total",
				"State snapshots applied from peers",
				&self.init_state_applied,
			),
		];

		let mut out = String::new();
		for (name, help, value) in counters {
			out.push_str(&format!("# HELP {} {}\n", name, help));
			out.push_str(&format!("# TYPE {} counter\n", name));
			out.push_str(&format!(
				"{}{{channel=\"{}\"}} {}\n",
				name,
				channel,
				value.load(Ordering::Relaxed)
			));
		}
		out
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[test]
	fn starts_at_zero() {
		let metrics = SyncMetrics::default();
		assert_eq!(metrics.actions_emitted.load(Ordering::Relaxed), 0);
		assert_eq!(metrics.init_state_applied.load(Ordering::Relaxed), 0);
	}

	#[test]
	fn prometheus_text() {
		let metrics = SyncMetrics::default();
		metrics.actions_emitted.store(5, Ordering::Relaxed);
		SyncMetrics::incr(&metrics.actions_dispatched);

		let text = metrics.to_prometheus_text("room");
		assert!(text.contains("# TYPE tabsync_actions_emitted_total counter"));
		assert!(text.contains("tabsync_actions_emitted_total{channel=\"room\"} 5"));
		assert!(text.contains("tabsync_actions_dispatched_total{channel=\"room\"} 1"));
	}
}
