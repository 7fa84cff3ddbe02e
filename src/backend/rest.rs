//! Backend implementation speaking the hosted REST wire format over reqwest.
//!
//! Every request carries the anonymous key in `apikey` and a bearer token: the current
//! session's access token when one is held, otherwise the anonymous key. Sessions are kept
//! in-process; [`RestBackend::restore`] seeds one from durable storage the host owns.
//!
//! Table, procedure, and storage calls refresh an expired session before they are sent.
//! Refreshes are single-flight so concurrent calls rotate the token once.

// crates.io
use reqwest::{Method, RequestBuilder, header::CONTENT_TYPE};
use serde_json::json;
// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Principal, PrincipalId, Secret, Session},
	backend::{
		BackendError, BackendFuture, CREATE_ORG_PROCEDURE, IdentityProvider, Membership,
		ModuleRow, ObjectStorage, OrgStore, OrganizationRow, ProfileRecord, RecordStore,
		SignUpOutcome, UploadOptions, public_object_url,
	},
	config::BackendConfig,
	demo::DemoRequest,
	error::ConfigError,
	http::{self, ReqwestHttpClient},
	upload::FileRecord,
};

const PREFER_MINIMAL: &str = "return=minimal";
const PREFER_REPRESENTATION: &str = "return=representation";
const PROCEDURE_NOT_FOUND_CODE: &str = "PGRST202";

/// REST client for the hosted identity, table, and storage APIs.
#[derive(Debug)]
pub struct RestBackend {
	config: BackendConfig,
	http: ReqwestHttpClient,
	session: RwLock<Option<Session>>,
	refreshing: AsyncMutex<()>,
}
impl RestBackend {
	/// Builds a backend with a default reqwest client.
	pub fn new(config: BackendConfig) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().build()?;

		Ok(Self::with_http_client(config, ReqwestHttpClient::with_client(client)))
	}

	/// Builds a backend around a caller-supplied HTTP client.
	pub fn with_http_client(config: BackendConfig, http: ReqwestHttpClient) -> Self {
		Self { config, http, session: RwLock::new(None), refreshing: AsyncMutex::new(()) }
	}

	/// Configuration the backend was built with.
	pub fn config(&self) -> &BackendConfig {
		&self.config
	}

	/// Installs a previously persisted session.
	pub fn restore(&self, session: Session) {
		*self.session.write() = Some(session);
	}

	/// Session currently held, without refreshing it.
	pub fn current_session(&self) -> Option<Session> {
		self.session.read().clone()
	}

	fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
		self.config.url.join(path).map_err(|e| BackendError::Serialization {
			message: format!("Endpoint `{path}` cannot be joined to the base URL: {e}"),
		})
	}

	/// Held session, refreshed first when it expired.
	///
	/// An expired session without a refresh token is dropped. A failed refresh drops it too
	/// and returns the error.
	async fn fresh_session(&self) -> Result<Option<Session>, BackendError> {
		let _refreshing = self.refreshing.lock().await;
		let Some(session) = self.current_session() else {
			return Ok(None);
		};

		if !session.is_expired_at(OffsetDateTime::now_utc()) {
			return Ok(Some(session));
		}

		let Some(refresh_token) = session.refresh_token.clone() else {
			*self.session.write() = None;

			return Ok(None);
		};

		match self.refresh(&refresh_token).await {
			Ok(session) => Ok(Some(session)),
			Err(e) => {
				*self.session.write() = None;

				Err(e)
			},
		}
	}

	/// Request carrying a token that has not expired.
	async fn authorized(&self, method: Method, url: Url) -> Result<RequestBuilder, BackendError> {
		self.fresh_session().await?;

		Ok(self.request(method, url))
	}

	fn request(&self, method: Method, url: Url) -> RequestBuilder {
		let bearer = self
			.session
			.read()
			.as_ref()
			.map(|session| session.access_token.expose().to_owned())
			.unwrap_or_else(|| self.config.anon_key.expose().to_owned());

		self.http
			.request(method, url)
			.header("apikey", self.config.anon_key.expose())
			.bearer_auth(bearer)
	}

	async fn token_grant(
		&self,
		grant_type: &str,
		body: serde_json::Value,
	) -> Result<Session, BackendError> {
		let mut url = self.endpoint("auth/v1/token")?;

		url.query_pairs_mut().append_pair("grant_type", grant_type);

		let response = http::execute(self.request(Method::POST, url).json(&body)).await?;
		let token: TokenResponse = http::decode(&response)?;
		let session = token.into_session(OffsetDateTime::now_utc());

		*self.session.write() = Some(session.clone());

		Ok(session)
	}

	async fn refresh(&self, refresh_token: &Secret) -> Result<Session, BackendError> {
		self.token_grant("refresh_token", json!({ "refresh_token": refresh_token.expose() })).await
	}

	async fn insert_minimal<T>(&self, table: &str, row: &T) -> Result<(), BackendError>
	where
		T: Serialize + Sync,
	{
		let url = self.endpoint(&format!("rest/v1/{table}"))?;

		let request = self.authorized(Method::POST, url).await?;

		http::execute(request.header("Prefer", PREFER_MINIMAL).json(row)).await?;

		Ok(())
	}

	fn storage_object_url(&self, bucket: &str, path: &str) -> Result<Url, BackendError> {
		let mut url = self.config.url.clone();

		url.path_segments_mut()
			.map_err(|_| BackendError::Serialization {
				message: format!("Base URL {} cannot carry a path", self.config.url),
			})?
			.pop_if_empty()
			.extend(["storage", "v1", "object", bucket])
			.extend(path.split('/').filter(|segment| !segment.is_empty()));

		Ok(url)
	}
}
impl IdentityProvider for RestBackend {
	fn get_session(&self) -> BackendFuture<'_, Option<Session>> {
		Box::pin(self.fresh_session())
	}

	fn sign_up<'a>(
		&'a self,
		email: &'a str,
		password: &'a Secret,
	) -> BackendFuture<'a, SignUpOutcome> {
		Box::pin(async move {
			let url = self.endpoint("auth/v1/signup")?;
			let body = json!({ "email": email, "password": password.expose() });
			let response = http::execute(self.request(Method::POST, url).json(&body)).await?;
			let outcome = http::decode::<SignUpResponse>(&response)?
				.into_outcome(OffsetDateTime::now_utc());

			if let Some(session) = &outcome.session {
				*self.session.write() = Some(session.clone());
			}

			Ok(outcome)
		})
	}

	fn sign_in_with_password<'a>(
		&'a self,
		email: &'a str,
		password: &'a Secret,
	) -> BackendFuture<'a, Session> {
		Box::pin(async move {
			self.token_grant("password", json!({ "email": email, "password": password.expose() }))
				.await
		})
	}

	fn sign_out(&self) -> BackendFuture<'_, ()> {
		Box::pin(async move {
			if self.current_session().is_none() {
				return Ok(());
			}

			let url = self.endpoint("auth/v1/logout")?;
			let result = http::execute(self.request(Method::POST, url)).await.map(|_| ());

			*self.session.write() = None;

			result
		})
	}
}
impl OrgStore for RestBackend {
	fn memberships<'a>(
		&'a self,
		principal: &'a PrincipalId,
	) -> BackendFuture<'a, Vec<Membership>> {
		Box::pin(async move {
			let mut url = self.endpoint("rest/v1/org_members")?;

			url.query_pairs_mut()
				.append_pair("select", "org_id,role,user_id")
				.append_pair("user_id", &format!("eq.{principal}"));

			let response = http::execute(self.authorized(Method::GET, url).await?).await?;

			http::decode(&response)
		})
	}

	fn organizations<'a>(
		&'a self,
		ids: &'a [OrganizationId],
	) -> BackendFuture<'a, Vec<OrganizationRow>> {
		Box::pin(async move {
			if ids.is_empty() {
				return Ok(Vec::new());
			}

			let list = ids.iter().map(|id| format!("\"{id}\"")).collect::<Vec<_>>().join(",");
			let mut url = self.endpoint("rest/v1/organizations")?;

			url.query_pairs_mut()
				.append_pair("select", "id,name")
				.append_pair("id", &format!("in.({list})"));

			let response = http::execute(self.authorized(Method::GET, url).await?).await?;

			http::decode(&response)
		})
	}

	fn create_org_with_owner<'a>(&'a self, name: &'a str) -> BackendFuture<'a, OrganizationId> {
		Box::pin(async move {
			let url = self.endpoint(&format!("rest/v1/rpc/{CREATE_ORG_PROCEDURE}"))?;
			let request = self.authorized(Method::POST, url).await?;
			let response = http::execute(request.json(&json!({ "p_name": name })))
				.await
				.map_err(procedure_error)?;

			match http::decode::<ProcedureResult>(&response)? {
				ProcedureResult::One(id) => Ok(id),
				ProcedureResult::Many(ids) => ids.into_iter().next().ok_or_else(|| {
					BackendError::Serialization {
						message: format!("Procedure `{CREATE_ORG_PROCEDURE}` returned no id"),
					}
				}),
			}
		})
	}

	fn insert_organization<'a>(
		&'a self,
		name: &'a str,
		created_by: &'a PrincipalId,
	) -> BackendFuture<'a, OrganizationRow> {
		Box::pin(async move {
			let url = self.endpoint("rest/v1/organizations")?;
			let body = json!({ "name": name, "created_by": created_by });
			let request = self.authorized(Method::POST, url).await?;
			let response =
				http::execute(request.header("Prefer", PREFER_REPRESENTATION).json(&body)).await?;

			http::decode::<Vec<OrganizationRow>>(&response)?.into_iter().next().ok_or_else(|| {
				BackendError::Serialization {
					message: "Organization insert returned no representation".into(),
				}
			})
		})
	}

	fn insert_membership(&self, membership: Membership) -> BackendFuture<'_, ()> {
		Box::pin(async move { self.insert_minimal("org_members", &membership).await })
	}

	fn delete_organization<'a>(&'a self, id: &'a OrganizationId) -> BackendFuture<'a, ()> {
		Box::pin(async move {
			let mut url = self.endpoint("rest/v1/organizations")?;

			url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));

			http::execute(self.authorized(Method::DELETE, url).await?).await?;

			Ok(())
		})
	}

	fn enabled_modules<'a>(
		&'a self,
		org: &'a OrganizationId,
	) -> BackendFuture<'a, Vec<ModuleRow>> {
		Box::pin(async move {
			let mut url = self.endpoint("rest/v1/org_modules")?;

			url.query_pairs_mut()
				.append_pair("select", "enabled,modules:module_id(code,name)")
				.append_pair("org_id", &format!("eq.{org}"))
				.append_pair("enabled", "eq.true");

			let response = http::execute(self.authorized(Method::GET, url).await?).await?;
			let rows: Vec<OrgModuleRow> = http::decode(&response)?;

			Ok(rows.into_iter().filter(|row| row.enabled).filter_map(|row| row.modules).collect())
		})
	}
}
impl RecordStore for RestBackend {
	fn insert_profile(&self, profile: ProfileRecord) -> BackendFuture<'_, ()> {
		Box::pin(async move { self.insert_minimal("profiles", &profile).await })
	}

	fn insert_demo_request(&self, request: DemoRequest) -> BackendFuture<'_, ()> {
		Box::pin(async move { self.insert_minimal("demo_requests", &request).await })
	}

	fn insert_file_record(&self, record: FileRecord) -> BackendFuture<'_, ()> {
		Box::pin(async move { self.insert_minimal("files_uploaded", &record).await })
	}
}
impl ObjectStorage for RestBackend {
	fn upload<'a>(
		&'a self,
		bucket: &'a str,
		path: &'a str,
		bytes: Vec<u8>,
		options: &'a UploadOptions,
	) -> BackendFuture<'a, ()> {
		Box::pin(async move {
			let url = self.storage_object_url(bucket, path)?;
			let request = self
				.authorized(Method::POST, url)
				.await?
				.header(CONTENT_TYPE, options.content_type.as_str())
				.header("cache-control", format!("max-age={}", options.cache_control_secs))
				.header("x-upsert", if options.upsert { "true" } else { "false" })
				.body(bytes);

			http::execute(request).await?;

			Ok(())
		})
	}

	fn public_url(&self, bucket: &str, path: &str) -> Result<Url, BackendError> {
		public_object_url(&self.config.url, bucket, path)
	}
}

#[derive(Debug, Deserialize)]
struct UserResponse {
	id: PrincipalId,
	#[serde(default)]
	email: Option<String>,
}
impl UserResponse {
	fn into_principal(self) -> Principal {
		Principal::new(self.id, self.email.unwrap_or_default())
	}
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: Secret,
	#[serde(default)]
	refresh_token: Option<Secret>,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	expires_at: Option<i64>,
	user: UserResponse,
}
impl TokenResponse {
	fn into_session(self, now: OffsetDateTime) -> Session {
		let expires_at = self
			.expires_at
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
			.or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
		let mut session = Session::new(self.user.into_principal(), self.access_token);

		session.refresh_token = self.refresh_token;
		session.expires_at = expires_at;

		session
	}
}

/// Sign-up answers either with a full session or, when confirmation is pending, a bare user.
#[derive(Debug, Default, Deserialize)]
struct SignUpResponse {
	#[serde(default)]
	access_token: Option<Secret>,
	#[serde(default)]
	refresh_token: Option<Secret>,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	expires_at: Option<i64>,
	#[serde(default)]
	user: Option<UserResponse>,
	#[serde(default)]
	id: Option<PrincipalId>,
	#[serde(default)]
	email: Option<String>,
}
impl SignUpResponse {
	fn into_outcome(self, now: OffsetDateTime) -> SignUpOutcome {
		let user = self
			.user
			.or_else(|| self.id.map(|id| UserResponse { id, email: self.email.clone() }));

		match (self.access_token, user) {
			(Some(access_token), Some(user)) => {
				let session = TokenResponse {
					access_token,
					refresh_token: self.refresh_token,
					expires_in: self.expires_in,
					expires_at: self.expires_at,
					user,
				}
				.into_session(now);

				SignUpOutcome { principal: Some(session.principal.clone()), session: Some(session) }
			},
			(_, user) =>
				SignUpOutcome { principal: user.map(UserResponse::into_principal), session: None },
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProcedureResult {
	One(OrganizationId),
	Many(Vec<OrganizationId>),
}

#[derive(Debug, Deserialize)]
struct OrgModuleRow {
	#[serde(default = "default_enabled")]
	enabled: bool,
	#[serde(default)]
	modules: Option<ModuleRow>,
}

fn default_enabled() -> bool {
	true
}

fn procedure_error(e: BackendError) -> BackendError {
	let missing = match &e {
		BackendError::Rejected { status, code, message } =>
			*status == Some(404)
				|| code.as_deref() == Some(PROCEDURE_NOT_FOUND_CODE)
				|| message.contains(CREATE_ORG_PROCEDURE),
		_ => false,
	};

	if missing {
		BackendError::ProcedureMissing { procedure: CREATE_ORG_PROCEDURE.into() }
	} else {
		e
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn principal_id(value: &str) -> PrincipalId {
		PrincipalId::new(value).expect("Fixture principal id should be valid.")
	}

	#[test]
	fn token_response_prefers_absolute_expiry() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);
		let session = TokenResponse {
			access_token: Secret::new("at"),
			refresh_token: Some(Secret::new("rt")),
			expires_in: Some(3600),
			expires_at: Some(now.unix_timestamp() + 60),
			user: UserResponse { id: principal_id("u1"), email: Some("u1@acme.io".into()) },
		}
		.into_session(now);

		assert_eq!(session.expires_at, Some(now + Duration::seconds(60)));
		assert_eq!(session.refresh_token, Some(Secret::new("rt")));
		assert_eq!(session.principal.email, "u1@acme.io");
	}

	#[test]
	fn sign_up_without_session_keeps_principal() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);
		let outcome = SignUpResponse {
			id: Some(principal_id("u2")),
			email: Some("u2@acme.io".into()),
			..Default::default()
		}
		.into_outcome(now);

		assert!(outcome.session.is_none());
		assert_eq!(outcome.principal, Some(Principal::new(principal_id("u2"), "u2@acme.io")));
	}

	#[test]
	fn procedure_errors_are_classified() {
		let not_found = BackendError::Rejected {
			status: Some(404),
			code: None,
			message: "Not Found".into(),
		};
		let coded = BackendError::Rejected {
			status: Some(400),
			code: Some(PROCEDURE_NOT_FOUND_CODE.into()),
			message: "Could not find the function".into(),
		};
		let denied = BackendError::Rejected {
			status: Some(403),
			code: Some("42501".into()),
			message: "permission denied".into(),
		};

		assert!(matches!(procedure_error(not_found), BackendError::ProcedureMissing { .. }));
		assert!(matches!(procedure_error(coded), BackendError::ProcedureMissing { .. }));
		assert_eq!(procedure_error(denied.clone()), denied);
	}
}
