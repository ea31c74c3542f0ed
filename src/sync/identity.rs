use std::fmt;

use uuid::Uuid;

/// Random token identifying one engine instance (one tab).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabId(String);

impl TabId {
	/// Fresh token in `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form.
	pub fn generate() -> Self {
		Self(Uuid::new_v4().hyphenated().to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TabId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::TabId;

	#[test]
	fn token_has_guid_layout() {
		let id = TabId::generate();
		let groups: Vec<&str> = id.as_str().split('-').collect();

		assert_eq!(
			groups.iter().map(|g| g.len()).collect::<Vec<_>>(),
			vec![8, 4, 4, 4, 12]
		);
		assert!(
			groups
				.iter()
				.all(|g| g.chars().all(|c| c.is_ascii_hexdigit()))
		);
	}

	#[test]
	fn tokens_differ_between_instances() {
		assert_ne!(TabId::generate(), TabId::generate());
	}
}
