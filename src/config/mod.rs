use std::path::Path;

use log::Level;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::{DEFAULT_CHANNEL_NAME, SyncConfig};

/// File/environment configuration for tabsync.
///
/// Values are loaded from (in order): `/etc/tabsync/tabsync.json`, the same
/// file name under the user config folders (optional), and environment
/// variables prefixed with `TABSYNC_` (e.g. `TABSYNC_CHANNEL_NAME`). List
/// values in the environment are comma separated. The predicate and the
/// state preparation hook can only be set from code, on the [`SyncConfig`]
/// returned by [`Settings::to_sync_config`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct Settings {
	pub channel_name: String,
	pub init_state: bool,
	pub blacklist: Option<Vec<String>>,
	pub whitelist: Option<Vec<String>>,
	pub log_level: Level,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			channel_name: DEFAULT_CHANNEL_NAME.to_string(),
			init_state: false,
			blacklist: None,
			whitelist: None,
			log_level: Level::Info,
		}
	}
}

impl Settings {
	pub fn to_sync_config(&self) -> SyncConfig {
		let mut config = SyncConfig::new()
			.with_channel_name(self.channel_name.clone())
			.with_init_state(self.init_state);
		if let Some(types) = &self.blacklist {
			config = config.with_blacklist(types.iter().cloned());
		}
		if let Some(types) = &self.whitelist {
			config = config.with_whitelist(types.iter().cloned());
		}
		config
	}
}

#[derive(Debug, Error)]
pub enum SettingsError {
	#[error("configuration error: {0}")]
	Config(#[from] config::ConfigError),
}

fn environment() -> config::Environment {
	config::Environment::with_prefix("TABSYNC")
		.separator("__")
		.try_parsing(true)
		.list_separator(",")
		.with_list_parse_key("blacklist")
		.with_list_parse_key("whitelist")
}

pub fn load() -> Result<Settings, SettingsError> {
	let mut builder = config::Config::builder()
		.add_source(config::File::with_name("/etc/tabsync/tabsync.json").required(false));

	if let Some(folder) = dirs::config_dir() {
		let user_config_path = folder.join("tabsync").join("tabsync.json");
		builder = builder.add_source(config::File::from(user_config_path).required(false));
	}
	if let Some(folder) = dirs::config_local_dir() {
		let local_config_path = folder.join("tabsync").join("tabsync.json");
		builder = builder.add_source(config::File::from(local_config_path).required(false));
	}

	builder = builder.add_source(environment());

	let mut s: Settings = builder.build()?.try_deserialize()?;
	apply_env_overrides(&mut s);
	Ok(s)
}

/// Load `path` on top of the defaults, then the environment.
pub fn load_from(path: &Path) -> Result<Settings, SettingsError> {
	let cfg = config::Config::builder()
		.add_source(config::File::from(path))
		.add_source(environment())
		.build()?;

	let mut s: Settings = cfg.try_deserialize()?;
	apply_env_overrides(&mut s);
	Ok(s)
}

fn split_types(raw: &str) -> Vec<String> {
	raw.split(',')
		.map(str::trim)
		.filter(|t| !t.is_empty())
		.map(String::from)
		.collect()
}

// Direct reads win over whatever the `config` crate mapped, so explicit
// overrides behave the same in every harness.
fn apply_env_overrides(s: &mut Settings) {
	if let Ok(name) = std::env::var("TABSYNC_CHANNEL_NAME") {
		if !name.is_empty() {
			s.channel_name = name;
		}
	}
	if let Ok(flag) = std::env::var("TABSYNC_INIT_STATE") {
		if let Ok(parsed) = flag.trim().parse::<bool>() {
			s.init_state = parsed;
		}
	}
	if let Ok(list) = std::env::var("TABSYNC_BLACKLIST") {
		if !list.is_empty() {
			s.blacklist = Some(split_types(&list));
		}
	}
	if let Ok(list) = std::env::var("TABSYNC_WHITELIST") {
		if !list.is_empty() {
			s.whitelist = Some(split_types(&list));
		}
	}
	if let Ok(l) = std::env::var("TABSYNC_LOG_LEVEL") {
		if let Ok(parsed) = l.parse::<Level>() {
			s.log_level = parsed;
		}
	}
}
