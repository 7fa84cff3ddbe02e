//! Thread-safe in-memory backend implementing every contract, for local development and tests.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Principal, PrincipalId, Role, Secret, Session},
	backend::{
		BackendError, BackendFuture, CREATE_ORG_PROCEDURE, IdentityProvider, Membership,
		ModuleRow, ObjectStorage, OrgStore, OrganizationRow, ProfileRecord, RecordStore,
		SignUpOutcome, UploadOptions, public_object_url,
	},
	demo::DemoRequest,
	upload::FileRecord,
};

/// Backend operations that can be faulted or counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// [`IdentityProvider::get_session`].
	GetSession,
	/// [`IdentityProvider::sign_up`].
	SignUp,
	/// [`IdentityProvider::sign_in_with_password`].
	SignIn,
	/// [`IdentityProvider::sign_out`].
	SignOut,
	/// [`OrgStore::memberships`].
	Memberships,
	/// [`OrgStore::organizations`].
	Organizations,
	/// [`OrgStore::create_org_with_owner`].
	CreateOrgWithOwner,
	/// [`OrgStore::insert_organization`].
	InsertOrganization,
	/// [`OrgStore::insert_membership`].
	InsertMembership,
	/// [`OrgStore::delete_organization`].
	DeleteOrganization,
	/// [`OrgStore::enabled_modules`].
	EnabledModules,
	/// [`RecordStore::insert_profile`].
	InsertProfile,
	/// [`RecordStore::insert_demo_request`].
	InsertDemoRequest,
	/// [`RecordStore::insert_file_record`].
	InsertFileRecord,
	/// [`ObjectStorage::upload`].
	Upload,
}

/// `organizations` row with its creator, as held by [`MemoryBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredOrganization {
	/// Organization id.
	pub id: OrganizationId,
	/// Display name.
	pub name: String,
	/// Principal that created the row.
	pub created_by: PrincipalId,
}

/// Object held by [`MemoryBackend`]'s storage buckets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
	/// Raw payload.
	pub bytes: Vec<u8>,
	/// Options supplied with the upload.
	pub options: UploadOptions,
}

#[derive(Debug)]
struct Account {
	principal: Principal,
	password: Secret,
}

#[derive(Debug)]
struct Tables {
	accounts: Vec<Account>,
	session: Option<Session>,
	organizations: Vec<StoredOrganization>,
	memberships: Vec<Membership>,
	modules: Vec<(OrganizationId, ModuleRow, bool)>,
	profiles: Vec<ProfileRecord>,
	demo_requests: Vec<DemoRequest>,
	files: Vec<FileRecord>,
	objects: HashMap<(String, String), StoredObject>,
	procedure_available: bool,
}
impl Default for Tables {
	fn default() -> Self {
		Self {
			accounts: Vec::new(),
			session: None,
			organizations: Vec::new(),
			memberships: Vec::new(),
			modules: Vec::new(),
			profiles: Vec::new(),
			demo_requests: Vec::new(),
			files: Vec::new(),
			objects: HashMap::new(),
			procedure_available: true,
		}
	}
}

/// In-process backend that keeps every table in memory.
///
/// Faults registered with [`MemoryBackend::fail`] stay active until cleared, and every call
/// is counted so tests can assert how often the dashboard reached the backend.
#[derive(Debug)]
pub struct MemoryBackend {
	base_url: Url,
	tables: RwLock<Tables>,
	faults: Mutex<HashMap<Operation, BackendError>>,
	calls: Mutex<HashMap<Operation, usize>>,
	next_id: AtomicU64,
}
impl Default for MemoryBackend {
	fn default() -> Self {
		Self::with_base_url(
			Url::parse("http://127.0.0.1:54321/").expect("Loopback URL literal is valid."),
		)
	}
}
impl MemoryBackend {
	/// Creates an empty backend whose public object URLs live under `base_url`.
	pub fn with_base_url(base_url: Url) -> Self {
		Self {
			base_url,
			tables: Default::default(),
			faults: Default::default(),
			calls: Default::default(),
			next_id: AtomicU64::new(1),
		}
	}

	/// Makes every subsequent call to `op` fail with `error`.
	pub fn fail(&self, op: Operation, error: BackendError) {
		self.faults.lock().insert(op, error);
	}

	/// Removes a fault registered with [`MemoryBackend::fail`].
	pub fn clear_failure(&self, op: Operation) {
		self.faults.lock().remove(&op);
	}

	/// Number of times `op` was invoked.
	pub fn calls(&self, op: Operation) -> usize {
		self.calls.lock().get(&op).copied().unwrap_or(0)
	}

	/// Toggles whether [`CREATE_ORG_PROCEDURE`] exists.
	pub fn set_procedure_available(&self, available: bool) {
		self.tables.write().procedure_available = available;
	}

	/// Registers a password account and returns its principal.
	pub fn register_account(&self, email: &str, password: &str) -> Principal {
		let principal = Principal::new(self.mint_principal_id(), email);

		self.tables
			.write()
			.accounts
			.push(Account { principal: principal.clone(), password: Secret::new(password) });

		principal
	}

	/// Installs a session for `principal` without checking credentials.
	pub fn act_as(&self, principal: &Principal) -> Session {
		let session = Session::new(principal.clone(), format!("access-{}", principal.id));

		self.tables.write().session = Some(session.clone());

		session
	}

	/// Inserts an organization row directly.
	pub fn insert_organization_row(&self, row: StoredOrganization) {
		self.tables.write().organizations.push(row);
	}

	/// Inserts a membership row directly.
	pub fn insert_membership_row(&self, org_id: OrganizationId, user_id: PrincipalId, role: Role) {
		self.tables.write().memberships.push(Membership { org_id, user_id, role });
	}

	/// Removes every membership of `user_id` in `org_id`.
	pub fn remove_membership_row(&self, org_id: &OrganizationId, user_id: &PrincipalId) {
		self.tables
			.write()
			.memberships
			.retain(|m| !(&m.org_id == org_id && &m.user_id == user_id));
	}

	/// Enables (or disables) a module for an organization.
	pub fn set_module(&self, org: OrganizationId, code: &str, name: &str, enabled: bool) {
		let row = ModuleRow { code: code.into(), name: Some(name.into()) };

		self.tables.write().modules.push((org, row, enabled));
	}

	/// Snapshot of the `organizations` table.
	pub fn organizations_table(&self) -> Vec<StoredOrganization> {
		self.tables.read().organizations.clone()
	}

	/// Snapshot of the `org_members` table.
	pub fn memberships_table(&self) -> Vec<Membership> {
		self.tables.read().memberships.clone()
	}

	/// Snapshot of the `profiles` table.
	pub fn profiles_table(&self) -> Vec<ProfileRecord> {
		self.tables.read().profiles.clone()
	}

	/// Snapshot of the `demo_requests` table.
	pub fn demo_requests_table(&self) -> Vec<DemoRequest> {
		self.tables.read().demo_requests.clone()
	}

	/// Snapshot of the `files_uploaded` table.
	pub fn files_table(&self) -> Vec<FileRecord> {
		self.tables.read().files.clone()
	}

	/// Object stored at `bucket/path`, if any.
	pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
		self.tables.read().objects.get(&(bucket.to_owned(), path.to_owned())).cloned()
	}

	/// Records the call and returns the registered fault, if any.
	fn enter(&self, op: Operation) -> Result<(), BackendError> {
		*self.calls.lock().entry(op).or_insert(0) += 1;

		match self.faults.lock().get(&op) {
			Some(error) => Err(error.clone()),
			None => Ok(()),
		}
	}

	fn mint_principal_id(&self) -> PrincipalId {
		let n = self.next_id.fetch_add(1, Ordering::Relaxed);

		PrincipalId::sequential("user", n)
	}

	fn mint_org_id(&self) -> OrganizationId {
		let n = self.next_id.fetch_add(1, Ordering::Relaxed);

		OrganizationId::sequential("org", n)
	}

	fn session_principal(&self) -> Result<Principal, BackendError> {
		self.tables
			.read()
			.session
			.as_ref()
			.map(|session| session.principal.clone())
			.ok_or(BackendError::Unauthenticated)
	}

	fn create_now(&self, name: &str, owner: &PrincipalId) -> OrganizationRow {
		let id = self.mint_org_id();
		let mut tables = self.tables.write();

		tables.organizations.push(StoredOrganization {
			id: id.clone(),
			name: name.to_owned(),
			created_by: owner.clone(),
		});

		OrganizationRow { id, name: name.to_owned() }
	}
}
impl IdentityProvider for MemoryBackend {
	fn get_session(&self) -> BackendFuture<'_, Option<Session>> {
		Box::pin(async move {
			self.enter(Operation::GetSession)?;

			Ok(self.tables.read().session.clone())
		})
	}

	fn sign_up<'a>(
		&'a self,
		email: &'a str,
		password: &'a Secret,
	) -> BackendFuture<'a, SignUpOutcome> {
		Box::pin(async move {
			self.enter(Operation::SignUp)?;

			if self.tables.read().accounts.iter().any(|a| a.principal.email == email) {
				return Err(BackendError::Rejected {
					status: Some(422),
					code: Some("user_already_exists".into()),
					message: "User already registered".into(),
				});
			}

			let principal = self.register_account(email, password.expose());
			let session = self.act_as(&principal);

			Ok(SignUpOutcome { principal: Some(principal), session: Some(session) })
		})
	}

	fn sign_in_with_password<'a>(
		&'a self,
		email: &'a str,
		password: &'a Secret,
	) -> BackendFuture<'a, Session> {
		Box::pin(async move {
			self.enter(Operation::SignIn)?;

			let principal = self
				.tables
				.read()
				.accounts
				.iter()
				.find(|a| a.principal.email == email && &a.password == password)
				.map(|a| a.principal.clone())
				.ok_or_else(|| BackendError::Rejected {
					status: Some(400),
					code: Some("invalid_credentials".into()),
					message: "Invalid login credentials".into(),
				})?;

			Ok(self.act_as(&principal))
		})
	}

	fn sign_out(&self) -> BackendFuture<'_, ()> {
		Box::pin(async move {
			self.enter(Operation::SignOut)?;
			self.tables.write().session = None;

			Ok(())
		})
	}
}
impl OrgStore for MemoryBackend {
	fn memberships<'a>(
		&'a self,
		principal: &'a PrincipalId,
	) -> BackendFuture<'a, Vec<Membership>> {
		Box::pin(async move {
			self.enter(Operation::Memberships)?;

			Ok(self
				.tables
				.read()
				.memberships
				.iter()
				.filter(|m| &m.user_id == principal)
				.cloned()
				.collect())
		})
	}

	fn organizations<'a>(
		&'a self,
		ids: &'a [OrganizationId],
	) -> BackendFuture<'a, Vec<OrganizationRow>> {
		Box::pin(async move {
			self.enter(Operation::Organizations)?;

			Ok(self
				.tables
				.read()
				.organizations
				.iter()
				.filter(|o| ids.contains(&o.id))
				.map(|o| OrganizationRow { id: o.id.clone(), name: o.name.clone() })
				.collect())
		})
	}

	fn create_org_with_owner<'a>(&'a self, name: &'a str) -> BackendFuture<'a, OrganizationId> {
		Box::pin(async move {
			self.enter(Operation::CreateOrgWithOwner)?;

			if !self.tables.read().procedure_available {
				return Err(BackendError::ProcedureMissing {
					procedure: CREATE_ORG_PROCEDURE.into(),
				});
			}

			let owner = self.session_principal()?;
			let row = self.create_now(name, &owner.id);

			self.insert_membership_row(row.id.clone(), owner.id, Role::Owner);

			Ok(row.id)
		})
	}

	fn insert_organization<'a>(
		&'a self,
		name: &'a str,
		created_by: &'a PrincipalId,
	) -> BackendFuture<'a, OrganizationRow> {
		Box::pin(async move {
			self.enter(Operation::InsertOrganization)?;

			Ok(self.create_now(name, created_by))
		})
	}

	fn insert_membership(&self, membership: Membership) -> BackendFuture<'_, ()> {
		Box::pin(async move {
			self.enter(Operation::InsertMembership)?;
			self.tables.write().memberships.push(membership);

			Ok(())
		})
	}

	fn delete_organization<'a>(&'a self, id: &'a OrganizationId) -> BackendFuture<'a, ()> {
		Box::pin(async move {
			self.enter(Operation::DeleteOrganization)?;

			let mut tables = self.tables.write();

			tables.organizations.retain(|o| &o.id != id);
			tables.memberships.retain(|m| &m.org_id != id);

			Ok(())
		})
	}

	fn enabled_modules<'a>(
		&'a self,
		org: &'a OrganizationId,
	) -> BackendFuture<'a, Vec<ModuleRow>> {
		Box::pin(async move {
			self.enter(Operation::EnabledModules)?;

			Ok(self
				.tables
				.read()
				.modules
				.iter()
				.filter(|(owner, _, enabled)| owner == org && *enabled)
				.map(|(_, row, _)| row.clone())
				.collect())
		})
	}
}
impl RecordStore for MemoryBackend {
	fn insert_profile(&self, profile: ProfileRecord) -> BackendFuture<'_, ()> {
		Box::pin(async move {
			self.enter(Operation::InsertProfile)?;
			self.tables.write().profiles.push(profile);

			Ok(())
		})
	}

	fn insert_demo_request(&self, request: DemoRequest) -> BackendFuture<'_, ()> {
		Box::pin(async move {
			self.enter(Operation::InsertDemoRequest)?;
			self.tables.write().demo_requests.push(request);

			Ok(())
		})
	}

	fn insert_file_record(&self, record: FileRecord) -> BackendFuture<'_, ()> {
		Box::pin(async move {
			self.enter(Operation::InsertFileRecord)?;
			self.tables.write().files.push(record);

			Ok(())
		})
	}
}
impl ObjectStorage for MemoryBackend {
	fn upload<'a>(
		&'a self,
		bucket: &'a str,
		path: &'a str,
		bytes: Vec<u8>,
		options: &'a UploadOptions,
	) -> BackendFuture<'a, ()> {
		Box::pin(async move {
			self.enter(Operation::Upload)?;

			let key = (bucket.to_owned(), path.to_owned());
			let mut tables = self.tables.write();

			if !options.upsert && tables.objects.contains_key(&key) {
				return Err(BackendError::Rejected {
					status: Some(409),
					code: Some("Duplicate".into()),
					message: "The resource already exists".into(),
				});
			}

			tables.objects.insert(key, StoredObject { bytes, options: options.clone() });

			Ok(())
		})
	}

	fn public_url(&self, bucket: &str, path: &str) -> Result<Url, BackendError> {
		public_object_url(&self.base_url, bucket, path)
	}
}
