//! Route guard: a pure decision over session and organization state.

// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Principal, PrincipalId},
	org::{OrgSnapshot, Organization},
	session::SessionSnapshot,
};

/// Path unauthorized visitors are sent to.
pub const LANDING_PATH: &str = "/";

/// Observable outcome of gating a dashboard route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
	/// Session or organization context is still resolving.
	Pending,
	/// Nobody is signed in.
	Unauthenticated,
	/// Signed in, but a member of no organization.
	NoOrg,
	/// The current selection is not one of the principal's organizations.
	Forbidden,
	/// The dashboard may render.
	Authorized,
}

/// What the dashboard route should do for a [`GuardState`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
	/// Render a loading placeholder.
	Placeholder,
	/// Leave the dashboard for the given path.
	Redirect(&'static str),
	/// Render the dashboard.
	Render,
}

/// Inputs the guard reads, borrowed from the provider snapshots.
#[derive(Clone, Copy, Debug)]
pub struct GuardInputs<'a> {
	/// Signed-in principal.
	pub principal: Option<&'a Principal>,
	/// Session restore still pending.
	pub session_loading: bool,
	/// Principal the organization context was loaded for.
	pub org_principal: Option<&'a PrincipalId>,
	/// Organization load still pending.
	pub org_loading: bool,
	/// Principal's organizations.
	pub organizations: &'a [Organization],
	/// Current organization selection.
	pub current: Option<&'a OrganizationId>,
}
impl<'a> GuardInputs<'a> {
	/// Collects inputs from the two provider snapshots.
	pub fn from_snapshots(session: &'a SessionSnapshot, orgs: &'a OrgSnapshot) -> Self {
		Self {
			principal: session.principal.as_ref(),
			session_loading: session.loading,
			org_principal: orgs.principal.as_ref(),
			org_loading: orgs.loading,
			organizations: &orgs.organizations,
			current: orgs.current.as_ref(),
		}
	}
}

/// Evaluates the guard. Checks run in a fixed order and the first match wins.
///
/// An organization context loaded for a different identity than the signed-in principal is
/// treated as still loading.
pub fn evaluate(inputs: GuardInputs<'_>) -> GuardState {
	if inputs.session_loading {
		return GuardState::Pending;
	}

	let Some(principal) = inputs.principal else {
		return GuardState::Unauthenticated;
	};

	if inputs.org_loading || inputs.org_principal != Some(&principal.id) {
		return GuardState::Pending;
	}
	if inputs.organizations.is_empty() {
		return GuardState::NoOrg;
	}

	match inputs.current {
		Some(current) if inputs.organizations.iter().any(|org| &org.id == current) =>
			GuardState::Authorized,
		Some(_) => GuardState::Forbidden,
		// Auto-selection has not been committed yet.
		None => GuardState::Pending,
	}
}

/// Maps a guard state onto the dashboard's rendering decision.
pub fn decide(state: GuardState) -> GuardDecision {
	match state {
		GuardState::Pending => GuardDecision::Placeholder,
		GuardState::Unauthenticated | GuardState::NoOrg | GuardState::Forbidden =>
			GuardDecision::Redirect(LANDING_PATH),
		GuardState::Authorized => GuardDecision::Render,
	}
}
