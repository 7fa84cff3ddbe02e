//! Contracts for the hosted backend collaborators plus built-in implementations.
//!
//! The backend-as-a-service is split along the seams the dashboard consumes: the identity
//! provider, the relational tables behind organizations, the append-only record tables
//! (profiles, demo requests, uploaded files), and object storage. [`MemoryBackend`]
//! implements every contract in-process for tests and demos; `RestBackend` speaks the
//! hosted REST wire format over reqwest.

pub mod memory;
#[cfg(feature = "reqwest")] pub mod rest;

pub use memory::*;
#[cfg(feature = "reqwest")] pub use rest::RestBackend;

// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Principal, PrincipalId, Role, Secret, Session},
	demo::DemoRequest,
	upload::FileRecord,
};

/// Boxed future returned by every backend contract.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + 'a + Send>>;

/// Name of the atomic server-side procedure that creates an organization with its owner.
pub const CREATE_ORG_PROCEDURE: &str = "create_org_with_owner";

/// Identity provider contract (sessions and password accounts).
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Returns the persisted session, if any.
	fn get_session(&self) -> BackendFuture<'_, Option<Session>>;

	/// Creates a password account.
	fn sign_up<'a>(
		&'a self,
		email: &'a str,
		password: &'a Secret,
	) -> BackendFuture<'a, SignUpOutcome>;

	/// Exchanges email + password for a session.
	fn sign_in_with_password<'a>(
		&'a self,
		email: &'a str,
		password: &'a Secret,
	) -> BackendFuture<'a, Session>;

	/// Ends the current session.
	fn sign_out(&self) -> BackendFuture<'_, ()>;
}

/// Relational store contract for organizations, memberships, and enabled modules.
pub trait OrgStore
where
	Self: Send + Sync,
{
	/// Lists `org_members` rows for the principal.
	fn memberships<'a>(&'a self, principal: &'a PrincipalId)
	-> BackendFuture<'a, Vec<Membership>>;

	/// Lists `organizations` rows whose id is in `ids`, in store order.
	fn organizations<'a>(
		&'a self,
		ids: &'a [OrganizationId],
	) -> BackendFuture<'a, Vec<OrganizationRow>>;

	/// Calls the atomic [`CREATE_ORG_PROCEDURE`] for the session principal.
	///
	/// Implementations report an unavailable procedure as [`BackendError::ProcedureMissing`].
	fn create_org_with_owner<'a>(&'a self, name: &'a str) -> BackendFuture<'a, OrganizationId>;

	/// Inserts an `organizations` row and returns its representation.
	fn insert_organization<'a>(
		&'a self,
		name: &'a str,
		created_by: &'a PrincipalId,
	) -> BackendFuture<'a, OrganizationRow>;

	/// Inserts an `org_members` row.
	fn insert_membership(&self, membership: Membership) -> BackendFuture<'_, ()>;

	/// Deletes an `organizations` row.
	fn delete_organization<'a>(&'a self, id: &'a OrganizationId) -> BackendFuture<'a, ()>;

	/// Lists modules enabled for the organization (`org_modules` joined to `modules`).
	fn enabled_modules<'a>(&'a self, org: &'a OrganizationId) -> BackendFuture<'a, Vec<ModuleRow>>;
}

/// Insert-only tables written by sign-up, the demo form, and CSV uploads.
pub trait RecordStore
where
	Self: Send + Sync,
{
	/// Inserts a `profiles` row.
	fn insert_profile(&self, profile: ProfileRecord) -> BackendFuture<'_, ()>;

	/// Inserts a `demo_requests` row.
	fn insert_demo_request(&self, request: DemoRequest) -> BackendFuture<'_, ()>;

	/// Inserts a `files_uploaded` row.
	fn insert_file_record(&self, record: FileRecord) -> BackendFuture<'_, ()>;
}

/// Object storage contract.
pub trait ObjectStorage
where
	Self: Send + Sync,
{
	/// Uploads `bytes` to `bucket/path`.
	fn upload<'a>(
		&'a self,
		bucket: &'a str,
		path: &'a str,
		bytes: Vec<u8>,
		options: &'a UploadOptions,
	) -> BackendFuture<'a, ()>;

	/// Resolves the public URL for an object.
	fn public_url(&self, bucket: &str, path: &str) -> Result<Url, BackendError>;
}

/// Error type produced by backend implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum BackendError {
	/// The requested remote procedure does not exist on the backend.
	#[error("Remote procedure `{procedure}` is not available.")]
	ProcedureMissing {
		/// Procedure name.
		procedure: String,
	},
	/// Backend answered with an error payload.
	#[error("Backend rejected the request: {message}.")]
	Rejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Backend error code (SQLSTATE, API code, etc.), when available.
		code: Option<String>,
		/// Human-readable error payload.
		message: String,
	},
	/// Request needs a signed-in session.
	#[error("Request requires an authenticated session.")]
	Unauthenticated,
	/// Network or IO failure before a response arrived.
	#[error("Transport failure: {message}.")]
	Transport {
		/// Human-readable error payload.
		message: String,
	},
	/// Response could not be decoded or encoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
}
impl BackendError {
	/// Convenience constructor for [`BackendError::Rejected`] without status or code.
	pub fn rejected(message: impl Into<String>) -> Self {
		Self::Rejected { status: None, code: None, message: message.into() }
	}

	/// Returns `true` when the error says the named procedure is unavailable.
	pub fn is_procedure_missing(&self, procedure: &str) -> bool {
		match self {
			Self::ProcedureMissing { procedure: missing } => missing == procedure,
			Self::Rejected { message, .. } => message.contains(procedure),
			_ => false,
		}
	}
}

/// Result of creating a password account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignUpOutcome {
	/// Principal created by the provider, when it returned one.
	pub principal: Option<Principal>,
	/// Session, when the provider signs the account in immediately.
	pub session: Option<Session>,
}

/// `org_members` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
	/// Organization the principal belongs to.
	pub org_id: OrganizationId,
	/// Member principal.
	pub user_id: PrincipalId,
	/// Role inside the organization.
	pub role: Role,
}

/// `organizations` row as selected by the dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRow {
	/// Organization id.
	pub id: OrganizationId,
	/// Display name.
	pub name: String,
}

/// `modules` row reachable through an enabled `org_modules` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRow {
	/// Stable module code (`finance`, `operations`, ...).
	pub code: String,
	/// Display name stored with the module.
	pub name: Option<String>,
}

/// `profiles` row captured during sign-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
	/// Principal id the profile belongs to.
	pub id: PrincipalId,
	/// Given name.
	pub first_name: String,
	/// Family name.
	pub last_name: String,
	/// Company the principal registered with.
	pub company_name: String,
	/// Email address.
	pub email: String,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Last update instant.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}

/// Upload options forwarded to object storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOptions {
	/// `Cache-Control` max-age in seconds.
	pub cache_control_secs: u32,
	/// Overwrite an existing object at the same path.
	pub upsert: bool,
	/// MIME type of the payload.
	pub content_type: String,
}

/// Builds `{base}/storage/v1/object/public/{bucket}/{path}`, percent-encoding each segment.
pub(crate) fn public_object_url(base: &Url, bucket: &str, path: &str) -> Result<Url, BackendError> {
	let mut url = base.clone();

	url.path_segments_mut()
		.map_err(|_| BackendError::Serialization {
			message: format!("Base URL {base} cannot carry a path"),
		})?
		.pop_if_empty()
		.extend(["storage", "v1", "object", "public", bucket])
		.extend(path.split('/').filter(|segment| !segment.is_empty()));

	Ok(url)
}
