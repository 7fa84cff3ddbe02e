//! Organization switcher view model.

// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Role},
	org::{OrgSnapshot, OrganizationResolver},
};

/// Entry listed by the switcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SwitcherOption {
	/// Organization id; also the option key.
	pub id: OrganizationId,
	/// Display name.
	pub name: String,
	/// Principal's role, shown next to the name.
	pub role: Role,
	/// `true` for the current selection.
	pub selected: bool,
}

/// Switcher contents; only built when there is something to switch between.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SwitcherView {
	/// One option per loaded organization, in resolver order.
	pub options: Vec<SwitcherOption>,
}
impl SwitcherView {
	/// Builds the view, or `None` while loading or when the principal has no organizations.
	pub fn from_snapshot(snapshot: &OrgSnapshot) -> Option<Self> {
		if snapshot.loading || snapshot.organizations.is_empty() {
			return None;
		}

		let options = snapshot
			.organizations
			.iter()
			.map(|org| SwitcherOption {
				id: org.id.clone(),
				name: org.name.clone(),
				role: org.role.clone(),
				selected: snapshot.current.as_ref() == Some(&org.id),
			})
			.collect();

		Some(Self { options })
	}

	/// Currently selected option.
	pub fn selected(&self) -> Option<&SwitcherOption> {
		self.options.iter().find(|option| option.selected)
	}
}

/// Reads the resolver and returns the switcher view, if it should be shown.
pub fn view(resolver: &OrganizationResolver) -> Option<SwitcherView> {
	SwitcherView::from_snapshot(&resolver.snapshot())
}

/// Applies a selection made in the switcher.
pub fn select(resolver: &OrganizationResolver, id: &OrganizationId) -> Result<()> {
	resolver.set_current_organization(id)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::org_id, org::Organization};

	fn snapshot(loading: bool, organizations: Vec<Organization>) -> OrgSnapshot {
		OrgSnapshot {
			principal: None,
			current: organizations.last().map(|org| org.id.clone()),
			current_role: None,
			organizations,
			loading,
			error: None,
		}
	}

	#[test]
	fn hidden_when_loading_or_empty() {
		let orgs = vec![Organization::new(org_id("a"), "Alpha", Role::Owner)];

		assert!(SwitcherView::from_snapshot(&snapshot(false, Vec::new())).is_none());
		assert!(SwitcherView::from_snapshot(&snapshot(true, orgs)).is_none());
	}

	#[test]
	fn marks_the_selection() {
		let view = SwitcherView::from_snapshot(&snapshot(false, vec![
			Organization::new(org_id("a"), "Alpha", Role::Owner),
			Organization::new(org_id("b"), "Beta", Role::Member),
		]))
		.expect("Non-empty, settled snapshots should render a switcher.");

		assert_eq!(view.options.len(), 2);
		assert_eq!(view.selected().map(|option| option.name.as_str()), Some("Beta"));
		assert!(!view.options[0].selected);
	}
}
