//! Organization set loading, selection, and lifecycle.

// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Principal, Role},
	backend::{Membership, OrgStore, OrganizationRow},
	config::CreationFallback,
	obs::{self, OpKind, OpOutcome, OpSpan},
	org::{LoadOutcome, OrgSnapshot, Organization, same_identity},
};

#[derive(Debug)]
pub(crate) struct ResolverState {
	pub(crate) principal: Option<Principal>,
	pub(crate) organizations: Vec<Organization>,
	pub(crate) current: Option<OrganizationId>,
	pub(crate) current_role: Option<Role>,
	pub(crate) loading: bool,
	pub(crate) error: Option<String>,
	pub(crate) generation: u64,
	pub(crate) torn_down: bool,
}
impl ResolverState {
	fn reset(&mut self, principal: Option<Principal>) {
		self.principal = principal;
		self.organizations.clear();
		self.current = None;
		self.current_role = None;
		self.error = None;
		self.generation += 1;
	}

	/// Keeps the selection when it survived, otherwise picks the first organization.
	pub(crate) fn reconcile_selection(&mut self) {
		let kept = self
			.current
			.as_ref()
			.and_then(|current| self.organizations.iter().find(|org| &org.id == current))
			.or_else(|| self.organizations.first())
			.map(|org| (org.id.clone(), org.role.clone()));

		(self.current, self.current_role) = match kept {
			Some((id, role)) => (Some(id), Some(role)),
			None => (None, None),
		};
	}

	pub(crate) fn select(&mut self, id: &OrganizationId) -> Result<()> {
		let role = self
			.organizations
			.iter()
			.find(|org| &org.id == id)
			.map(|org| org.role.clone())
			.ok_or_else(|| Error::NotAMember { organization: id.clone() })?;

		self.current = Some(id.clone());
		self.current_role = Some(role);

		Ok(())
	}

	pub(crate) fn accepts(&self, generation: u64, principal: &Principal) -> bool {
		!self.torn_down
			&& self.generation == generation
			&& same_identity(self.principal.as_ref(), Some(principal))
	}
}
impl Default for ResolverState {
	fn default() -> Self {
		Self {
			principal: None,
			organizations: Vec::new(),
			current: None,
			current_role: None,
			loading: true,
			error: None,
			generation: 0,
			torn_down: false,
		}
	}
}

/// Session-scoped organization context for the signed-in principal.
///
/// State lives behind a [`RwLock`] that is never held across an `.await`. Every load takes a
/// generation ticket; responses for an older ticket, a different principal, or a torn-down
/// resolver are discarded instead of applied.
pub struct OrganizationResolver {
	pub(crate) store: Arc<dyn OrgStore>,
	pub(crate) fallback: CreationFallback,
	pub(crate) state: RwLock<ResolverState>,
}
impl OrganizationResolver {
	/// Creates a resolver with the default creation fallback policy.
	pub fn new(store: Arc<dyn OrgStore>) -> Self {
		Self { store, fallback: CreationFallback::default(), state: Default::default() }
	}

	/// Overrides what creation does when the atomic procedure is missing.
	pub fn with_fallback(mut self, fallback: CreationFallback) -> Self {
		self.fallback = fallback;

		self
	}

	/// Store the resolver reads from.
	pub fn store(&self) -> &Arc<dyn OrgStore> {
		&self.store
	}

	/// Copies the current state.
	pub fn snapshot(&self) -> OrgSnapshot {
		let state = self.state.read();

		OrgSnapshot {
			principal: state.principal.as_ref().map(|principal| principal.id.clone()),
			organizations: state.organizations.clone(),
			current: state.current.clone(),
			current_role: state.current_role.clone(),
			loading: state.loading,
			error: state.error.clone(),
		}
	}

	/// Loaded organizations.
	pub fn organizations(&self) -> Vec<Organization> {
		self.state.read().organizations.clone()
	}

	/// Currently selected organization.
	pub fn current_organization(&self) -> Option<Organization> {
		let state = self.state.read();
		let current = state.current.as_ref()?;

		state.organizations.iter().find(|org| &org.id == current).cloned()
	}

	/// Role of the principal in the current organization.
	pub fn current_role(&self) -> Option<Role> {
		self.state.read().current_role.clone()
	}

	/// `true` while a load is pending.
	pub fn is_loading(&self) -> bool {
		self.state.read().loading
	}

	/// Soft error recorded by the last failed load.
	pub fn error(&self) -> Option<String> {
		self.state.read().error.clone()
	}

	/// `true` once [`OrganizationResolver::teardown`] ran.
	pub fn is_torn_down(&self) -> bool {
		self.state.read().torn_down
	}

	/// Reacts to the session provider reporting a (possibly absent) principal.
	///
	/// `None` resets the state and invalidates in-flight loads, a different identity resets
	/// and loads, and the same identity leaves everything untouched.
	pub async fn on_principal_change(&self, principal: Option<Principal>) -> LoadOutcome {
		{
			let mut state = self.state.write();

			if state.torn_down {
				return LoadOutcome::Superseded;
			}

			match &principal {
				None => {
					state.reset(None);
					state.loading = false;

					return LoadOutcome::Cleared;
				},
				Some(next) if same_identity(state.principal.as_ref(), Some(next)) => {
					state.principal = Some(next.clone());

					return LoadOutcome::Unchanged;
				},
				Some(next) => state.reset(Some(next.clone())),
			}
		}

		self.reload().await
	}

	/// Loads the organization set for the current principal.
	///
	/// Never returns an error: failures empty the set, clear the selection, and keep the
	/// message as the soft error.
	pub async fn reload(&self) -> LoadOutcome {
		const KIND: OpKind = OpKind::OrgLoad;

		let (principal, generation) = {
			let mut state = self.state.write();

			if state.torn_down {
				return LoadOutcome::Superseded;
			}

			let Some(principal) = state.principal.clone() else {
				state.reset(None);
				state.loading = false;

				return LoadOutcome::Cleared;
			};

			state.generation += 1;
			state.loading = true;

			(principal, state.generation)
		};
		let span = OpSpan::new(KIND, "reload");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let fetched = span.instrument(self.fetch(&principal)).await;
		let mut state = self.state.write();

		if !state.accepts(generation, &principal) {
			obs::record_discarded(KIND, generation);
			obs::record_op_outcome(KIND, OpOutcome::Superseded);

			return LoadOutcome::Superseded;
		}

		state.loading = false;

		match fetched {
			Ok(organizations) => {
				state.organizations = organizations.clone();
				state.error = None;
				state.reconcile_selection();
				obs::record_op_outcome(KIND, OpOutcome::Success);

				LoadOutcome::Loaded(organizations)
			},
			Err(e) => {
				let message = e.to_string();

				obs::record_soft_failure(KIND, &e);
				obs::record_op_outcome(KIND, OpOutcome::Failure);

				state.organizations.clear();
				state.current = None;
				state.current_role = None;
				state.error = Some(message.clone());

				LoadOutcome::Failed { message }
			},
		}
	}

	/// Selects an organization from the loaded set.
	pub fn set_current_organization(&self, id: &OrganizationId) -> Result<()> {
		const KIND: OpKind = OpKind::OrgSwitch;

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = {
			let mut state = self.state.write();

			if state.torn_down { Err(Error::TornDown) } else { state.select(id) }
		};

		match &result {
			Ok(()) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	/// Stops applying responses and refuses further mutations.
	pub fn teardown(&self) {
		let mut state = self.state.write();

		state.torn_down = true;
		state.generation += 1;
	}

	async fn fetch(&self, principal: &Principal) -> Result<Vec<Organization>> {
		let memberships = self.store.memberships(&principal.id).await?;

		if memberships.is_empty() {
			return Ok(Vec::new());
		}

		let ids = memberships.iter().map(|m| m.org_id.clone()).collect::<Vec<_>>();
		let rows = self.store.organizations(&ids).await?;

		Ok(join_roles(rows, &memberships))
	}
}
impl Debug for OrganizationResolver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OrganizationResolver")
			.field("fallback", &self.fallback)
			.field("state", &*self.state.read())
			.finish()
	}
}

/// Attaches each membership's role to its organization row, keeping store order. Rows with
/// no matching membership are dropped.
fn join_roles(rows: Vec<OrganizationRow>, memberships: &[Membership]) -> Vec<Organization> {
	let roles = memberships
		.iter()
		.map(|m| (&m.org_id, &m.role))
		.collect::<HashMap<&OrganizationId, &Role>>();

	rows.into_iter()
		.filter_map(|row| {
			let role = (*roles.get(&row.id)?).clone();

			Some(Organization { id: row.id, name: row.name, role })
		})
		.collect()
}
