use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::sync::action::Action;

/// Channel used when the caller does not name one.
pub const DEFAULT_CHANNEL_NAME: &str = "redux_state_sync";

pub type Predicate = Arc<dyn Fn(&Action) -> bool + Send + Sync>;
pub type PrepareState = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Engine configuration. Immutable once handed to an engine.
///
/// When more than one filter is set only the strongest one applies:
/// `predicate` over `blacklist` over `whitelist`.
#[derive(Clone)]
pub struct SyncConfig {
	pub channel_name: String,
	/// Ask peers for their state on startup
	pub init_state: bool,
	pub blacklist: Option<HashSet<String>>,
	pub whitelist: Option<HashSet<String>>,
	pub predicate: Option<Predicate>,
	/// Shapes the snapshot sent to a tab asking for initial state
	pub prepare_state: PrepareState,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			channel_name: DEFAULT_CHANNEL_NAME.to_string(),
			init_state: false,
			blacklist: None,
			whitelist: None,
			predicate: None,
			prepare_state: Arc::new(|state| state),
		}
	}
}

impl SyncConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
		self.channel_name = name.into();
		self
	}

	pub fn with_init_state(mut self, init_state: bool) -> Self {
		self.init_state = init_state;
		self
	}

	pub fn with_blacklist<I, S>(mut self, types: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.blacklist = Some(types.into_iter().map(Into::into).collect());
		self
	}

	pub fn with_whitelist<I, S>(mut self, types: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.whitelist = Some(types.into_iter().map(Into::into).collect());
		self
	}

	pub fn with_predicate<F>(mut self, predicate: F) -> Self
	where
		F: Fn(&Action) -> bool + Send + Sync + 'static,
	{
		self.predicate = Some(Arc::new(predicate));
		self
	}

	pub fn with_prepare_state<F>(mut self, prepare: F) -> Self
	where
		F: Fn(Value) -> Value + Send + Sync + 'static,
	{
		self.prepare_state = Arc::new(prepare);
		self
	}
}

impl fmt::Debug for SyncConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SyncConfig")
			.field("channel_name", &self.channel_name)
			.field("init_state", &self.init_state)
			.field("blacklist", &self.blacklist)
			.field("whitelist", &self.whitelist)
			.field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
			.finish_non_exhaustive()
	}
}
