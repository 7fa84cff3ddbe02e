//! Dashboard shell: the explicit context object tying the session provider to the
//! organization resolver and the dashboard's write paths.
//!
//! The shell forwards every principal change from the session provider to the resolver, so
//! sign-in, sign-out, and pushed auth events keep the organization context in step with the
//! signed-in identity.

// self
use crate::{
	_prelude::*,
	auth::{AuthEvent, OrganizationId, Principal, Secret},
	backend::{IdentityProvider, ObjectStorage, OrgStore, RecordStore},
	config::BackendConfig,
	demo::{self, DemoRequest},
	guard::{self, GuardInputs, GuardState},
	modules::{self, ModuleEntry},
	org::{LoadOutcome, OrgSnapshot, OrganizationResolver},
	route::{self, Navigation},
	session::{SessionProvider, SessionSnapshot, SignUpRequest},
	switcher::{self, SwitcherView},
	upload::{CsvFile, CsvUploader, FileRecord},
};

/// Session, organization context, and dashboard actions for one signed-in surface.
pub struct DashboardShell {
	session: Arc<SessionProvider>,
	orgs: Arc<OrganizationResolver>,
	records: Arc<dyn RecordStore>,
	uploader: CsvUploader,
	config: BackendConfig,
}
impl DashboardShell {
	/// Wires the providers and write-path collaborators together.
	pub fn new(
		session: Arc<SessionProvider>,
		orgs: Arc<OrganizationResolver>,
		storage: Arc<dyn ObjectStorage>,
		records: Arc<dyn RecordStore>,
		config: BackendConfig,
	) -> Self {
		let uploader = CsvUploader::new(storage, records.clone(), &config);

		Self { session, orgs, records, uploader, config }
	}

	/// Builds every collaborator from one backend implementing all contracts.
	///
	/// The resolver's creation fallback follows `config.creation_fallback`.
	pub fn connect<B>(backend: Arc<B>, config: BackendConfig) -> Self
	where
		B: 'static + IdentityProvider + OrgStore + RecordStore + ObjectStorage,
	{
		let records: Arc<dyn RecordStore> = backend.clone();
		let session = Arc::new(SessionProvider::new(backend.clone(), records.clone()));
		let orgs = Arc::new(
			OrganizationResolver::new(backend.clone()).with_fallback(config.creation_fallback),
		);

		Self::new(session, orgs, backend, records, config)
	}

	/// Session provider.
	pub fn session(&self) -> &Arc<SessionProvider> {
		&self.session
	}

	/// Organization resolver.
	pub fn organizations(&self) -> &Arc<OrganizationResolver> {
		&self.orgs
	}

	/// Backend configuration.
	pub fn config(&self) -> &BackendConfig {
		&self.config
	}

	/// Restores the session and loads its organizations.
	pub async fn init(&self) -> LoadOutcome {
		let principal = self.session.init().await;

		self.orgs.on_principal_change(principal).await
	}

	/// Applies an auth state change and resynchronizes the organization context.
	pub async fn apply_auth_event(&self, event: &AuthEvent) -> LoadOutcome {
		let principal = self.session.apply_auth_event(event).await;

		self.orgs.on_principal_change(principal).await
	}

	/// Signs in, then loads the principal's organizations.
	pub async fn sign_in(&self, email: &str, password: &Secret) -> Result<Principal> {
		let principal = self.session.sign_in(email, password).await?;

		self.orgs.on_principal_change(Some(principal.clone())).await;

		Ok(principal)
	}

	/// Creates an account; when it signs in immediately, loads its (empty) organization set.
	pub async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<Principal>> {
		let created = self.session.sign_up(request).await?;

		if let Some(principal) = self.session.principal() {
			self.orgs.on_principal_change(Some(principal)).await;
		}

		Ok(created)
	}

	/// Signs out and clears the organization context, even when the provider call fails.
	pub async fn sign_out(&self) -> Result<()> {
		let result = self.session.sign_out().await;

		self.orgs.on_principal_change(self.session.principal()).await;

		result
	}

	/// Session state copy.
	pub fn session_snapshot(&self) -> SessionSnapshot {
		self.session.snapshot()
	}

	/// Organization state copy.
	pub fn org_snapshot(&self) -> OrgSnapshot {
		self.orgs.snapshot()
	}

	/// Evaluates the route guard against the current state.
	pub fn guard_state(&self) -> GuardState {
		let session = self.session.snapshot();
		let orgs = self.orgs.snapshot();

		guard::evaluate(GuardInputs::from_snapshots(&session, &orgs))
	}

	/// Resolves a requested path.
	pub fn navigate(&self, path: &str) -> Navigation {
		let session = self.session.snapshot();
		let orgs = self.orgs.snapshot();
		let state = guard::evaluate(GuardInputs::from_snapshots(&session, &orgs));

		route::navigate(path, session.loading, session.principal.is_some(), state)
	}

	/// Organization switcher contents, if it should be shown.
	pub fn switcher(&self) -> Option<SwitcherView> {
		switcher::view(&self.orgs)
	}

	/// Switches the current organization.
	pub fn select_organization(&self, id: &OrganizationId) -> Result<()> {
		switcher::select(&self.orgs, id)
	}

	/// Creates an organization owned by the signed-in principal and selects it.
	pub async fn create_organization(&self, name: &str) -> Result<OrganizationId> {
		let principal = self.session.principal().ok_or(Error::NotAuthenticated)?;

		self.orgs.create_organization(name, &principal).await
	}

	/// Sidebar entries for the current organization; empty without one.
	pub async fn enabled_modules(&self) -> Vec<ModuleEntry> {
		let Some(current) = self.orgs.snapshot().current else {
			return Vec::new();
		};

		modules::enabled_modules(self.orgs.store().as_ref(), &current).await
	}

	/// Uploads a CSV file into the current organization.
	pub async fn upload_csv(&self, file: CsvFile) -> Result<FileRecord> {
		if self.orgs.is_torn_down() {
			return Err(Error::TornDown);
		}

		let principal = self.session.principal();
		let current = self.orgs.snapshot().current;

		self.uploader.upload(principal.as_ref(), current.as_ref(), file).await
	}

	/// Stores a demo request from the landing page.
	pub async fn submit_demo_request(&self, request: DemoRequest) -> Result<()> {
		demo::submit_demo_request(self.records.as_ref(), request).await
	}

	/// Stops both providers; in-flight responses are dropped and mutations refused.
	pub fn teardown(&self) {
		self.session.teardown();
		self.orgs.teardown();
	}
}
impl Debug for DashboardShell {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DashboardShell")
			.field("session", &self.session)
			.field("orgs", &self.orgs)
			.field("uploader", &self.uploader)
			.finish_non_exhaustive()
	}
}
