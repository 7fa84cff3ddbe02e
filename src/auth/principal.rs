//! Signed-in principal and the session that carries it.

// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, Secret},
};

/// Authenticated identity of the current user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
	/// Opaque identity id.
	pub id: PrincipalId,
	/// Email address the principal signed in with.
	pub email: String,
}
impl Principal {
	/// Creates a principal from its id and email.
	pub fn new(id: PrincipalId, email: impl Into<String>) -> Self {
		Self { id, email: email.into() }
	}
}

/// Session issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	/// Principal the session belongs to.
	pub principal: Principal,
	/// Bearer token presented to the relational store and object storage.
	pub access_token: Secret,
	/// Refresh token, if the provider issued one.
	pub refresh_token: Option<Secret>,
	/// Expiry instant, if the provider reported one.
	#[serde(with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
}
impl Session {
	/// Creates a session without refresh metadata.
	pub fn new(principal: Principal, access_token: impl Into<Secret>) -> Self {
		Self { principal, access_token: access_token.into(), refresh_token: None, expires_at: None }
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<Secret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Sets the absolute expiry instant.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Returns `true` once the session is past its expiry; sessions without expiry never expire.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| instant >= expires_at)
	}
}

/// Auth state change notifications emitted by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
	/// Initial session restored at startup (none for anonymous visitors).
	InitialSession(Option<Session>),
	/// Principal signed in.
	SignedIn(Session),
	/// Access token was rotated for the same principal.
	TokenRefreshed(Session),
	/// Principal metadata changed.
	UserUpdated(Session),
	/// Principal signed out.
	SignedOut,
}
impl AuthEvent {
	/// Principal carried by the event, if any.
	pub fn principal(&self) -> Option<&Principal> {
		match self {
			Self::InitialSession(session) => session.as_ref().map(|s| &s.principal),
			Self::SignedIn(session) | Self::TokenRefreshed(session) | Self::UserUpdated(session) =>
				Some(&session.principal),
			Self::SignedOut => None,
		}
	}
}
