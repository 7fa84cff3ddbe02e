//! Membership roles as stored in `org_members.role`.

// self
use crate::_prelude::*;

/// Role a principal holds inside an organization.
///
/// The backing store defines roles as free-form strings; the well-known ones get dedicated
/// variants and everything else is preserved verbatim in [`Role::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
	/// Creator and administrator of the organization.
	Owner,
	/// Elevated member.
	Admin,
	/// Regular member.
	Member,
	/// Any other source-defined role.
	Other(String),
}
impl Role {
	/// Returns the wire representation.
	pub fn as_str(&self) -> &str {
		match self {
			Self::Owner => "owner",
			Self::Admin => "admin",
			Self::Member => "member",
			Self::Other(value) => value,
		}
	}
}
impl From<String> for Role {
	fn from(value: String) -> Self {
		match value.as_str() {
			"owner" => Self::Owner,
			"admin" => Self::Admin,
			"member" => Self::Member,
			_ => Self::Other(value),
		}
	}
}
impl From<&str> for Role {
	fn from(value: &str) -> Self {
		Self::from(value.to_owned())
	}
}
impl From<Role> for String {
	fn from(value: Role) -> Self {
		match value {
			Role::Other(value) => value,
			known => known.as_str().to_owned(),
		}
	}
}
impl Display for Role {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn unknown_roles_survive_serde() {
		let role: Role = serde_json::from_str("\"billing\"").expect("Role should deserialize.");

		assert_eq!(role, Role::Other("billing".into()));
		assert_eq!(serde_json::to_string(&role).expect("Role should serialize."), "\"billing\"");
		assert_eq!(Role::from("owner"), Role::Owner);
	}
}
