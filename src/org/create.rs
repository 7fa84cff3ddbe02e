//! Organization creation with an atomic procedure and a compensated two-step fallback.

// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Principal, Role},
	backend::{CREATE_ORG_PROCEDURE, Membership},
	config::CreationFallback,
	error::ValidationError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	org::{Organization, OrganizationResolver, same_identity},
};

impl OrganizationResolver {
	/// Creates an organization owned by `principal`, then selects it.
	///
	/// The atomic `create_org_with_owner` procedure is tried first. When the store reports it
	/// missing and the fallback policy is [`CreationFallback::Compensating`], the organization
	/// row and owner membership are inserted separately; a failed membership insert deletes
	/// the row again and surfaces as [`Error::MembershipRolledBack`] (or
	/// [`Error::OrphanedOrganization`] when the delete fails too).
	pub async fn create_organization(
		&self,
		name: &str,
		principal: &Principal,
	) -> Result<OrganizationId> {
		const KIND: OpKind = OpKind::OrgCreate;

		let name = name.trim();

		if name.is_empty() {
			return Err(ValidationError::Required { field: "organization name" }.into());
		}
		if self.is_torn_down() {
			return Err(Error::TornDown);
		}

		let span = OpSpan::new(KIND, "create_organization");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				match self.store.create_org_with_owner(name).await {
					Ok(id) => {
						self.adopt_after_procedure(&id, name, principal).await;

						Ok(id)
					},
					Err(e)
						if e.is_procedure_missing(CREATE_ORG_PROCEDURE)
							&& self.fallback == CreationFallback::Compensating =>
					{
						obs::record_soft_failure(KIND, &e);

						let id = self.create_in_two_steps(name, principal).await?;

						self.adopt(Organization::new(id.clone(), name, Role::Owner), principal);

						Ok(id)
					},
					Err(e) => Err(e.into()),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	async fn create_in_two_steps(
		&self,
		name: &str,
		principal: &Principal,
	) -> Result<OrganizationId> {
		let row = self.store.insert_organization(name, &principal.id).await?;
		let membership =
			Membership { org_id: row.id.clone(), user_id: principal.id.clone(), role: Role::Owner };

		let Err(source) = self.store.insert_membership(membership).await else {
			return Ok(row.id);
		};

		match self.store.delete_organization(&row.id).await {
			Ok(()) => Err(Error::MembershipRolledBack { organization: row.id, source }),
			Err(cleanup) =>
				Err(Error::OrphanedOrganization { organization: row.id, cleanup, source }),
		}
	}

	/// Reloads from the store, then selects the new organization.
	async fn adopt_after_procedure(
		&self,
		id: &OrganizationId,
		name: &str,
		principal: &Principal,
	) {
		self.reload().await;

		let present = self.state.read().organizations.iter().any(|org| &org.id == id);

		if !present {
			self.adopt(Organization::new(id.clone(), name, Role::Owner), principal);

			return;
		}

		let mut state = self.state.write();

		if !state.torn_down && same_identity(state.principal.as_ref(), Some(principal)) {
			let _ = state.select(id);
		}
	}

	/// Appends the organization locally and selects it, unless the session moved on.
	fn adopt(&self, organization: Organization, principal: &Principal) {
		let mut state = self.state.write();

		if state.torn_down || !same_identity(state.principal.as_ref(), Some(principal)) {
			return;
		}

		let id = organization.id.clone();

		if !state.organizations.iter().any(|org| org.id == id) {
			state.organizations.push(organization);
		}

		state.loading = false;
		state.error = None;

		let _ = state.select(&id);
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::{
		_preludet::{build_memory_resolver, principal},
		backend::{BackendError, MemoryBackend, Operation},
	};

	fn signed_in(backend: &MemoryBackend) -> Principal {
		let user = backend.register_account("owner@acme.io", "pw");

		backend.act_as(&user);

		user
	}

	#[test]
	fn blank_names_are_rejected_before_the_store() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for creation test.");
		let backend = Arc::new(MemoryBackend::default());
		let resolver = build_memory_resolver(backend.clone());
		let err = rt
			.block_on(resolver.create_organization("   ", &principal("u1", "u1@acme.io")))
			.expect_err("Blank names should be rejected.");

		assert!(matches!(err, Error::Validation(ValidationError::Required { .. })));
		assert_eq!(backend.calls(Operation::CreateOrgWithOwner), 0);
	}

	#[test]
	fn procedure_path_reloads_and_selects() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for creation test.");
		let backend = Arc::new(MemoryBackend::default());
		let user = signed_in(&backend);
		let resolver = build_memory_resolver(backend.clone());

		rt.block_on(resolver.on_principal_change(Some(user.clone())));

		let id = rt
			.block_on(resolver.create_organization("  Acme  ", &user))
			.expect("Procedure creation should succeed.");
		let snapshot = resolver.snapshot();

		assert_eq!(snapshot.current, Some(id.clone()));
		assert_eq!(snapshot.current_role, Some(Role::Owner));
		assert_eq!(snapshot.current_organization().map(|org| org.name.as_str()), Some("Acme"));
		assert_eq!(backend.calls(Operation::Memberships), 2);
		assert_eq!(backend.calls(Operation::InsertOrganization), 0);
	}

	#[test]
	fn fallback_path_appends_without_reload() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for creation test.");
		let backend = Arc::new(MemoryBackend::default());
		let user = signed_in(&backend);
		let resolver = build_memory_resolver(backend.clone());

		backend.set_procedure_available(false);
		rt.block_on(resolver.on_principal_change(Some(user.clone())));

		let id = rt
			.block_on(resolver.create_organization("Acme", &user))
			.expect("Fallback creation should succeed.");

		assert_eq!(resolver.snapshot().current, Some(id.clone()));
		assert_eq!(backend.calls(Operation::Memberships), 1);
		assert_eq!(
			backend.memberships_table(),
			vec![Membership { org_id: id, user_id: user.id, role: Role::Owner }]
		);
	}

	#[test]
	fn disabled_fallback_returns_missing_procedure() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for creation test.");
		let backend = Arc::new(MemoryBackend::default());
		let user = signed_in(&backend);
		let resolver =
			build_memory_resolver(backend.clone()).with_fallback(CreationFallback::Disabled);

		backend.set_procedure_available(false);

		let err = rt
			.block_on(resolver.create_organization("Acme", &user))
			.expect_err("Disabled fallback should surface the missing procedure.");

		assert!(matches!(err, Error::Backend(BackendError::ProcedureMissing { .. })));
		assert!(backend.organizations_table().is_empty());
		assert_eq!(backend.calls(Operation::InsertOrganization), 0);
	}

	#[test]
	fn failed_compensation_names_the_orphan() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for creation test.");
		let backend = Arc::new(MemoryBackend::default());
		let user = signed_in(&backend);
		let resolver = build_memory_resolver(backend.clone());

		backend.set_procedure_available(false);
		backend.fail(Operation::InsertMembership, BackendError::rejected("row-level security"));
		backend.fail(Operation::DeleteOrganization, BackendError::Transport {
			message: "connection reset".into(),
		});
		rt.block_on(resolver.on_principal_change(Some(user.clone())));

		let err = rt
			.block_on(resolver.create_organization("Acme", &user))
			.expect_err("Orphaned creation should fail.");

		match err {
			Error::OrphanedOrganization { organization, .. } => {
				assert_eq!(backend.organizations_table()[0].id, organization);
			},
			other => panic!("Unexpected error: {other:?}"),
		}

		assert!(resolver.snapshot().current.is_none());
	}
}
