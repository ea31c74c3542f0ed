use std::collections::HashSet;
use std::fmt;

use crate::sync::action::Action;
use crate::sync::options::{Predicate, SyncConfig};

/// Decides which actions may cross between tabs.
#[derive(Clone)]
pub enum AllowPolicy {
	Predicate(Predicate),
	Blacklist(HashSet<String>),
	Whitelist(HashSet<String>),
	AllowAll,
}

impl AllowPolicy {
	/// Pick the single filter that applies, checked in fixed order.
	pub fn from_config(config: &SyncConfig) -> Self {
		if let Some(predicate) = &config.predicate {
			AllowPolicy::Predicate(predicate.clone())
		} else if let Some(blacklist) = &config.blacklist {
			AllowPolicy::Blacklist(blacklist.clone())
		} else if let Some(whitelist) = &config.whitelist {
			AllowPolicy::Whitelist(whitelist.clone())
		} else {
			AllowPolicy::AllowAll
		}
	}

	pub fn allows(&self, action: &Action) -> bool {
		match self {
			AllowPolicy::Predicate(predicate) => predicate(action),
			AllowPolicy::Blacklist(types) => !types.contains(&action.kind),
			AllowPolicy::Whitelist(types) => types.contains(&action.kind),
			AllowPolicy::AllowAll => true,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			AllowPolicy::Predicate(_) => "predicate",
			AllowPolicy::Blacklist(_) => "blacklist",
			AllowPolicy::Whitelist(_) => "whitelist",
			AllowPolicy::AllowAll => "allow-all",
		}
	}
}

impl fmt::Debug for AllowPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AllowPolicy::Blacklist(types) => f.debug_tuple("Blacklist").field(types).finish(),
			AllowPolicy::Whitelist(types) => f.debug_tuple("Whitelist").field(types).finish(),
			other => f.write_str(other.name()),
		}
	}
}
