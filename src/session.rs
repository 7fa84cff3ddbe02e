//! Identity session provider: the signed-in principal, its loading flag, and auth transitions.

// self
use crate::{
	_prelude::*,
	auth::{AuthEvent, Principal, Secret},
	backend::{BackendError, IdentityProvider, ProfileRecord, RecordStore},
	error::ValidationError,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Point-in-time copy of the session state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
	/// Signed-in principal, if any.
	pub principal: Option<Principal>,
	/// `true` until the initial session restore settled.
	pub loading: bool,
}

/// Account creation form.
#[derive(Clone, Debug)]
pub struct SignUpRequest {
	/// Login email.
	pub email: String,
	/// Chosen password.
	pub password: Secret,
	/// Given name stored on the profile.
	pub first_name: String,
	/// Family name stored on the profile.
	pub last_name: String,
	/// Company stored on the profile.
	pub company_name: String,
}
impl SignUpRequest {
	/// Creates a request with empty profile fields.
	pub fn new(email: impl Into<String>, password: impl Into<Secret>) -> Self {
		Self {
			email: email.into(),
			password: password.into(),
			first_name: String::new(),
			last_name: String::new(),
			company_name: String::new(),
		}
	}

	/// Sets the given and family names.
	pub fn with_name(
		mut self,
		first_name: impl Into<String>,
		last_name: impl Into<String>,
	) -> Self {
		self.first_name = first_name.into();
		self.last_name = last_name.into();

		self
	}

	/// Sets the company name.
	pub fn with_company(mut self, company_name: impl Into<String>) -> Self {
		self.company_name = company_name.into();

		self
	}

	fn validate(&self) -> Result<(), ValidationError> {
		validate_credentials(&self.email, &self.password)
	}
}

#[derive(Debug)]
struct SessionState {
	principal: Option<Principal>,
	loading: bool,
	torn_down: bool,
}

/// Tracks the signed-in principal on top of an [`IdentityProvider`].
///
/// Transitions (`init`, sign-in, sign-up, sign-out, pushed auth events) are serialized by an
/// async mutex, so an event lands after any transition already in flight. The state itself
/// sits behind a [`RwLock`] that is never held across an `.await`.
pub struct SessionProvider {
	identity: Arc<dyn IdentityProvider>,
	records: Arc<dyn RecordStore>,
	state: RwLock<SessionState>,
	transitions: AsyncMutex<()>,
}
impl SessionProvider {
	/// Creates a provider in the loading state with no principal.
	pub fn new(identity: Arc<dyn IdentityProvider>, records: Arc<dyn RecordStore>) -> Self {
		Self {
			identity,
			records,
			state: RwLock::new(SessionState { principal: None, loading: true, torn_down: false }),
			transitions: AsyncMutex::new(()),
		}
	}

	/// Copies the current state.
	pub fn snapshot(&self) -> SessionSnapshot {
		let state = self.state.read();

		SessionSnapshot { principal: state.principal.clone(), loading: state.loading }
	}

	/// Signed-in principal, if any.
	pub fn principal(&self) -> Option<Principal> {
		self.state.read().principal.clone()
	}

	/// `true` until the initial session restore settled.
	pub fn is_loading(&self) -> bool {
		self.state.read().loading
	}

	/// Restores the persisted session. Failures degrade to an anonymous session.
	pub async fn init(&self) -> Option<Principal> {
		const KIND: OpKind = OpKind::SessionRestore;

		let _transition = self.transitions.lock().await;
		let span = OpSpan::new(KIND, "init");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let restored = match span.instrument(self.identity.get_session()).await {
			Ok(session) => {
				obs::record_op_outcome(KIND, OpOutcome::Success);

				session.map(|session| session.principal)
			},
			Err(e) => {
				obs::record_soft_failure(KIND, &e);
				obs::record_op_outcome(KIND, OpOutcome::Failure);

				None
			},
		};

		self.settle(restored)
	}

	/// Applies an auth state change pushed by the identity provider once any in-flight
	/// transition settled.
	pub async fn apply_auth_event(&self, event: &AuthEvent) -> Option<Principal> {
		let _transition = self.transitions.lock().await;

		self.settle(event.principal().cloned())
	}

	/// Signs in with email + password. On failure the session state is left unchanged.
	pub async fn sign_in(&self, email: &str, password: &Secret) -> Result<Principal> {
		const KIND: OpKind = OpKind::SignIn;

		validate_credentials(email, password)?;

		let _transition = self.transitions.lock().await;

		self.ensure_active()?;

		let span = OpSpan::new(KIND, "sign_in");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(self.identity.sign_in_with_password(email.trim(), password))
			.await
			.map_err(auth_error);

		match result {
			Ok(session) => {
				obs::record_op_outcome(KIND, OpOutcome::Success);
				self.settle(Some(session.principal.clone()));

				Ok(session.principal)
			},
			Err(e) => {
				obs::record_op_outcome(KIND, OpOutcome::Failure);

				Err(e)
			},
		}
	}

	/// Creates an account and captures its profile row.
	///
	/// A failing profile insert is logged only. When the provider signs the account in
	/// immediately the returned session's principal becomes current.
	pub async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<Principal>> {
		const KIND: OpKind = OpKind::SignUp;

		request.validate()?;

		let _transition = self.transitions.lock().await;

		self.ensure_active()?;

		let span = OpSpan::new(KIND, "sign_up");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let outcome = self
					.identity
					.sign_up(request.email.trim(), &request.password)
					.await
					.map_err(auth_error)?;

				if let Some(principal) = &outcome.principal {
					self.capture_profile(principal, request).await;
				}

				Ok::<_, Error>(outcome)
			})
			.await;

		match result {
			Ok(outcome) => {
				obs::record_op_outcome(KIND, OpOutcome::Success);

				if let Some(session) = outcome.session {
					self.settle(Some(session.principal));
				}

				Ok(outcome.principal)
			},
			Err(e) => {
				obs::record_op_outcome(KIND, OpOutcome::Failure);

				Err(e)
			},
		}
	}

	/// Signs out. The principal is cleared even when the provider call fails.
	pub async fn sign_out(&self) -> Result<()> {
		const KIND: OpKind = OpKind::SignOut;

		let _transition = self.transitions.lock().await;

		self.ensure_active()?;

		let span = OpSpan::new(KIND, "sign_out");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.identity.sign_out()).await;

		self.settle(None);

		match result {
			Ok(()) => {
				obs::record_op_outcome(KIND, OpOutcome::Success);

				Ok(())
			},
			Err(e) => {
				obs::record_op_outcome(KIND, OpOutcome::Failure);

				Err(e.into())
			},
		}
	}

	/// Stops accepting transitions; later events are ignored.
	pub fn teardown(&self) {
		self.state.write().torn_down = true;
	}

	fn ensure_active(&self) -> Result<()> {
		if self.state.read().torn_down { Err(Error::TornDown) } else { Ok(()) }
	}

	fn settle(&self, principal: Option<Principal>) -> Option<Principal> {
		let mut state = self.state.write();

		if state.torn_down {
			return state.principal.clone();
		}

		state.principal = principal;
		state.loading = false;

		state.principal.clone()
	}

	async fn capture_profile(&self, principal: &Principal, request: &SignUpRequest) {
		let now = OffsetDateTime::now_utc();
		let email = if principal.email.is_empty() {
			request.email.trim()
		} else {
			principal.email.as_str()
		};
		let profile = ProfileRecord {
			id: principal.id.clone(),
			first_name: request.first_name.trim().to_owned(),
			last_name: request.last_name.trim().to_owned(),
			company_name: request.company_name.trim().to_owned(),
			email: email.to_owned(),
			created_at: now,
			updated_at: now,
		};

		if let Err(e) = self.records.insert_profile(profile).await {
			obs::record_soft_failure(OpKind::SignUp, &e);
		}
	}
}
impl Debug for SessionProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionProvider").field("state", &*self.state.read()).finish()
	}
}

fn validate_credentials(email: &str, password: &Secret) -> Result<(), ValidationError> {
	if email.trim().is_empty() {
		return Err(ValidationError::Required { field: "email" });
	}
	if password.expose().is_empty() {
		return Err(ValidationError::Required { field: "password" });
	}

	Ok(())
}

fn auth_error(e: BackendError) -> Error {
	match e {
		BackendError::Rejected { message, .. } => Error::Auth { reason: message },
		other => other.into(),
	}
}
