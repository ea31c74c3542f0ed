//! Runs several tabs against one in-process hub and reports where each one
//! ended up. Backs the `tabsync simulate` command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};

use crate::channel::LocalHub;
use crate::store::{ReducerStore, Store};
use crate::sync::{Action, SyncConfig, SyncMiddleware};

/// How queued messages reach the tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	/// Pump every inbox until the hub is quiet
	Flush,
	/// One tokio driver per endpoint; wait for the tabs to converge
	Live { timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
	pub tabs: usize,
	/// INCREMENT actions dispatched from the first tab
	pub increments: usize,
	/// Open one more tab with `init_state` after the increments
	pub late_joiner: bool,
	pub delivery: Delivery,
}

impl Default for SimulationOptions {
	fn default() -> Self {
		Self {
			tabs: 2,
			increments: 3,
			late_joiner: true,
			delivery: Delivery::Flush,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct TabReport {
	pub index: usize,
	pub tab_id: String,
	pub late_joiner: bool,
	pub state: Value,
	pub metrics: String,
}

struct Tab {
	store: Arc<ReducerStore>,
	late_joiner: bool,
}

/// Reducer used by every simulated tab.
pub fn counter_reducer(state: &Value, action: &Action) -> Value {
	let count = state["count"].as_i64().unwrap_or(0);
	match action.kind.as_str() {
		"INCREMENT" => json!({"count": count + 1}),
		"DECREMENT" => json!({"count": count - 1}),
		"RESET" => json!({"count": 0}),
		_ => state.clone(),
	}
}

fn open_tab(hub: &LocalHub, config: SyncConfig, late_joiner: bool) -> Result<Tab> {
	let store = ReducerStore::new(json!({"count": 0}), counter_reducer);
	let middleware = SyncMiddleware::new(config, hub, &store).context("failed to open tab")?;
	store
		.attach(middleware)
		.map_err(|_| anyhow!("store already has a middleware"))?;
	Ok(Tab { store, late_joiner })
}

fn engine_of(tab: &Tab) -> Result<&Arc<crate::sync::SyncEngine>> {
	tab.store
		.middleware()
		.map(SyncMiddleware::engine)
		.ok_or_else(|| anyhow!("tab has no middleware"))
}

/// Run the scenario and report every tab's final state.
pub async fn run_simulation(
	config: SyncConfig,
	opts: &SimulationOptions,
) -> Result<Vec<TabReport>> {
	if opts.tabs == 0 {
		anyhow::bail!("at least one tab is required");
	}

	let hub = LocalHub::new();
	let channel = config.channel_name.clone();
	let mut tabs = Vec::with_capacity(opts.tabs + 1);
	for _ in 0..opts.tabs {
		tabs.push(open_tab(&hub, config.clone(), false)?);
	}

	let mut drivers = Vec::new();
	if let Delivery::Live { .. } = opts.delivery {
		drivers.extend(hub.endpoints(&channel).iter().map(|e| e.spawn()));
	}

	for _ in 0..opts.increments {
		tabs[0].store.try_dispatch(Action::new("INCREMENT"))?;
	}
	settle(&hub, &tabs, opts.delivery).await;

	if opts.late_joiner {
		let late = open_tab(&hub, config.clone().with_init_state(true), true)?;
		if let Delivery::Live { .. } = opts.delivery {
			let endpoint = hub
				.endpoints(&channel)
				.into_iter()
				.last()
				.ok_or_else(|| anyhow!("late tab has no endpoint"))?;
			drivers.push(endpoint.spawn());
		}
		tabs.push(late);
		settle(&hub, &tabs, opts.delivery).await;
	}

	hub.close_channel(&channel);
	for driver in drivers {
		driver.await.context("endpoint driver panicked")?;
	}

	let mut reports = Vec::with_capacity(tabs.len());
	for (index, tab) in tabs.iter().enumerate() {
		let engine = engine_of(tab)?;
		reports.push(TabReport {
			index,
			tab_id: engine.tab_id().to_string(),
			late_joiner: tab.late_joiner,
			state: tab.store.get_state(),
			metrics: engine.metrics().to_prometheus_text(engine.channel_name()),
		});
	}
	info!("Simulation finished with {} tab(s)", reports.len());
	Ok(reports)
}

async fn settle(hub: &LocalHub, tabs: &[Tab], delivery: Delivery) {
	match delivery {
		Delivery::Flush => {
			hub.flush();
		}
		Delivery::Live { timeout } => {
			let deadline = Instant::now() + timeout;
			while !converged(tabs) {
				if Instant::now() >= deadline {
					warn!("Tabs did not converge within {:?}", timeout);
					return;
				}
				sleep(Duration::from_millis(5)).await;
			}
		}
	}
}

fn converged(tabs: &[Tab]) -> bool {
	let mut states = tabs.iter().map(|t| t.store.get_state());
	match states.next() {
		Some(first) => states.all(|s| s == first),
		None => true,
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[tokio::test]
	async fn flushed_tabs_converge_including_late_joiner() {
		let opts = SimulationOptions {
			tabs: 3,
			increments: 4,
			late_joiner: true,
			delivery: Delivery::Flush,
		};
		let reports = run_simulation(SyncConfig::new(), &opts).await.unwrap();

		assert_eq!(reports.len(), 4);
		for report in &reports {
			assert_eq!(report.state, json!({"count": 4}), "tab {}", report.index);
		}
		assert!(reports[3].late_joiner);
	}

	#[tokio::test]
	async fn blacklisted_actions_stay_local() {
		let opts = SimulationOptions {
			tabs: 2,
			increments: 2,
			late_joiner: false,
			delivery: Delivery::Flush,
		};
		let config = SyncConfig::new().with_blacklist(["INCREMENT"]);
		let reports = run_simulation(config, &opts).await.unwrap();

		assert_eq!(reports[0].state, json!({"count": 2}));
		assert_eq!(reports[1].state, json!({"count": 0}));
	}

	#[tokio::test]
	async fn live_delivery_converges_including_late_joiner() {
		let opts = SimulationOptions {
			tabs: 2,
			increments: 3,
			late_joiner: true,
			delivery: Delivery::Live {
				timeout: Duration::from_secs(2),
			},
		};
		let config = SyncConfig::new().with_channel_name("live-sim");
		let reports = run_simulation(config, &opts).await.unwrap();

		assert_eq!(reports.len(), 3);
		for report in &reports {
			assert_eq!(report.state, json!({"count": 3}), "tab {}", report.index);
		}
		assert!(reports[2].late_joiner);
		let applied = "tabsync_init_state_applied_total{channel=\"live-sim\"} 1";
		assert!(reports[2].metrics.contains(applied));
	}

	#[tokio::test]
	async fn zero_tabs_is_rejected() {
		let opts = SimulationOptions {
			tabs: 0,
			..SimulationOptions::default()
		};
		assert!(run_simulation(SyncConfig::new(), &opts).await.is_err());
	}
}
