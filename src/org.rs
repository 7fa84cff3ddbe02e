//! Organization context: the principal's organizations, their roles, and the current selection.
//!
//! [`OrganizationResolver`] owns the organization set for whichever principal the session
//! provider reports. Loads never fail outward; they settle into an empty set plus a soft
//! error string so the route guard can fall back to its `NoOrg` branch. Organization
//! creation lives in [`create`] and returns its failures to the caller.

pub mod create;
pub mod resolver;

pub use resolver::*;

// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Principal, PrincipalId, Role},
};

/// Organization the current principal belongs to, with the principal's role.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Organization {
	/// Unique organization id.
	pub id: OrganizationId,
	/// Display name.
	pub name: String,
	/// Role of the current principal inside this organization.
	pub role: Role,
}
impl Organization {
	/// Creates an organization entry.
	pub fn new(id: OrganizationId, name: impl Into<String>, role: Role) -> Self {
		Self { id, name: name.into(), role }
	}
}

/// Point-in-time copy of the resolver state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrgSnapshot {
	/// Principal the organization set belongs to.
	pub principal: Option<PrincipalId>,
	/// Loaded organizations, in store order.
	pub organizations: Vec<Organization>,
	/// Current selection; always an element of `organizations` when set.
	pub current: Option<OrganizationId>,
	/// Role of the principal in the current organization.
	pub current_role: Option<Role>,
	/// `true` while a load is in flight or before the first principal resolution.
	pub loading: bool,
	/// Soft error recorded by the last failed load.
	pub error: Option<String>,
}
impl OrgSnapshot {
	/// Organization matching the current selection.
	pub fn current_organization(&self) -> Option<&Organization> {
		let current = self.current.as_ref()?;

		self.organizations.iter().find(|org| &org.id == current)
	}

	/// Returns `true` when `id` is part of the loaded set.
	pub fn contains(&self, id: &OrganizationId) -> bool {
		self.organizations.iter().any(|org| &org.id == id)
	}
}

/// Result of a load request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
	/// Fresh organizations were applied.
	Loaded(Vec<Organization>),
	/// The store failed; the set is empty and the message is kept as the soft error.
	Failed {
		/// Soft error message.
		message: String,
	},
	/// A newer load, a principal change, or a teardown made this response stale.
	Superseded,
	/// No principal; state was reset.
	Cleared,
	/// Principal identity did not change; nothing was reloaded.
	Unchanged,
}
impl LoadOutcome {
	/// Organizations applied by the load, if any.
	pub fn organizations(&self) -> Option<&[Organization]> {
		match self {
			Self::Loaded(organizations) => Some(organizations),
			_ => None,
		}
	}
}

pub(crate) fn same_identity(left: Option<&Principal>, right: Option<&Principal>) -> bool {
	match (left, right) {
		(Some(left), Some(right)) => left.id == right.id,
		(None, None) => true,
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{org_id, principal};

	#[test]
	fn snapshot_finds_current_organization() {
		let snapshot = OrgSnapshot {
			principal: None,
			organizations: vec![
				Organization::new(org_id("a"), "Alpha", Role::Owner),
				Organization::new(org_id("b"), "Beta", Role::Member),
			],
			current: Some(org_id("b")),
			current_role: Some(Role::Member),
			loading: false,
			error: None,
		};

		assert_eq!(snapshot.current_organization().map(|org| org.name.as_str()), Some("Beta"));
		assert!(snapshot.contains(&org_id("a")));
		assert!(!snapshot.contains(&org_id("c")));
	}

	#[test]
	fn identity_comparison_ignores_email() {
		let first = principal("u1", "old@acme.io");
		let renamed = principal("u1", "new@acme.io");
		let other = principal("u2", "old@acme.io");

		assert!(same_identity(Some(&first), Some(&renamed)));
		assert!(!same_identity(Some(&first), Some(&other)));
		assert!(!same_identity(Some(&first), None));
		assert!(same_identity(None, None));
	}
}
