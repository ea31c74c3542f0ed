use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Asks peer tabs for a snapshot of their state.
pub const GET_INIT_STATE: &str = "&_GET_INIT_STATE";

/// Carries a state snapshot back to the tab that asked for it.
pub const RECEIVE_INIT_STATE: &str = "&_RECEIVE_INIT_STATE";

/// Keys owned by [`Action`]'s own fields; never stored in `extra`.
pub const RESERVED_KEYS: [&str; 4] = ["type", "payload", "$wuid", "$isSync"];

/// A state-change action as it flows through the store and across the channel.
///
/// Fields other than `type`, `payload` and the two sync markers are kept in
/// `extra` so that application-specific keys survive the round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
	/// Discriminator
	#[serde(rename = "type")]
	pub kind: String,
	/// `Some(Value::Null)` for an explicit `null`; `None` only when absent
	#[serde(
		default,
		deserialize_with = "present_value",
		skip_serializing_if = "Option::is_none"
	)]
	pub payload: Option<Value>,
	/// Identity of the tab that broadcast this action
	#[serde(rename = "$wuid", default, skip_serializing_if = "Option::is_none")]
	pub wuid: Option<String>,
	/// Set once the action has passed the middleware
	#[serde(rename = "$isSync", default, skip_serializing_if = "Option::is_none")]
	pub is_sync: Option<bool>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl Action {
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			payload: None,
			wuid: None,
			is_sync: None,
			extra: Map::new(),
		}
	}

	pub fn with_payload(mut self, payload: Value) -> Self {
		self.payload = Some(payload);
		self
	}

	/// Add an application field. Reserved keys (see [`RESERVED_KEYS`]) are
	/// ignored; use the typed fields for those.
	pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
		let key = key.into();
		if !RESERVED_KEYS.contains(&key.as_str()) {
			self.extra.insert(key, value);
		}
		self
	}

	/// Copy of this action tagged with the sending tab's identity.
	pub fn stamped(&self, wuid: &str) -> Self {
		let mut out = self.clone();
		out.wuid = Some(wuid.to_string());
		out
	}

	/// Copy of this action with `$isSync` forced to `value`.
	pub fn with_sync_flag(&self, value: bool) -> Self {
		let mut out = self.clone();
		out.is_sync = Some(value);
		out
	}

	/// Copy with `$isSync` defaulted to `false` when it was never set.
	pub fn normalized(mut self) -> Self {
		if self.is_sync.is_none() {
			self.is_sync = Some(false);
		}
		self
	}

	/// True for the two handshake markers, which bypass the allow policy.
	pub fn is_control(&self) -> bool {
		self.kind == GET_INIT_STATE || self.kind == RECEIVE_INIT_STATE
	}

	pub fn to_value(&self) -> Result<Value, serde_json::Error> {
		serde_json::to_value(self)
	}

	/// Decode a message body. Anything without a string `type` is rejected.
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::Object(map) if map.get("type").is_some_and(Value::is_string) => {
				serde_json::from_value(value.clone()).ok()
			}
			_ => None,
		}
	}
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
	D: Deserializer<'de>,
{
	Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn wire_shape_uses_dollar_markers() {
		let action = Action::new("ADD")
			.with_payload(json!({"n": 1}))
			.stamped("abc")
			.with_sync_flag(true);

		let value = action.to_value().unwrap();
		assert_eq!(
			value,
			json!({"type": "ADD", "payload": {"n": 1}, "$wuid": "abc", "$isSync": true})
		);
	}

	#[test]
	fn unknown_fields_survive_decoding() {
		let value = json!({"type": "ADD", "meta": {"source": "ui"}});
		let action = Action::from_value(&value).unwrap();

		assert_eq!(action.kind, "ADD");
		assert_eq!(action.extra.get("meta"), Some(&json!({"source": "ui"})));
		assert_eq!(action.to_value().unwrap(), value);
	}

	#[test]
	fn non_actions_are_rejected() {
		assert!(Action::from_value(&json!(null)).is_none());
		assert!(Action::from_value(&json!("ADD")).is_none());
		assert!(Action::from_value(&json!({"payload": 1})).is_none());
		assert!(Action::from_value(&json!({"type": 7})).is_none());
	}

	#[test]
	fn stamping_does_not_touch_the_original() {
		let original = Action::new("ADD");
		let stamped = original.stamped("tab-1");

		assert_eq!(original.wuid, None);
		assert_eq!(stamped.wuid.as_deref(), Some("tab-1"));
		assert_eq!(stamped.stamped("tab-1"), stamped);
	}

	#[test]
	fn normalization_keeps_existing_flag() {
		assert_eq!(Action::new("X").normalized().is_sync, Some(false));
		assert_eq!(
			Action::new("X").with_sync_flag(true).normalized().is_sync,
			Some(true)
		);
	}

	#[test]
	fn control_markers() {
		assert!(Action::new(GET_INIT_STATE).is_control());
		assert!(Action::new(RECEIVE_INIT_STATE).is_control());
		assert!(!Action::new("GET_INIT_STATE").is_control());
	}

	#[test]
	fn explicit_null_payload_is_kept() {
		let value = json!({"type": "CLEAR", "payload": null});
		let action = Action::from_value(&value).unwrap();

		assert_eq!(action.payload, Some(Value::Null));
		assert_eq!(action.to_value().unwrap(), value);

		let absent = Action::from_value(&json!({"type": "CLEAR"})).unwrap();
		assert_eq!(absent.payload, None);
	}

	#[test]
	fn reserved_keys_cannot_be_set_as_fields() {
		let action = Action::new("ADD")
			.stamped("tab-1")
			.with_field("type", json!("OTHER"))
			.with_field("$wuid", json!("spoofed"))
			.with_field("$isSync", json!(true))
			.with_field("payload", json!(1))
			.with_field("meta", json!("kept"));

		assert_eq!(action.extra.len(), 1);
		assert_eq!(
			action.to_value().unwrap(),
			json!({"type": "ADD", "$wuid": "tab-1", "meta": "kept"})
		);
	}
}
