//! Session, organization, and route-gating core for a multi-tenant SaaS dashboard.
//!
//! The crate resolves the signed-in principal, picks the organization context, and decides
//! whether a dashboard route may render, talking to a hosted backend-as-a-service through the
//! contracts in [`backend`].

#![deny(clippy::all)]
#![warn(missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod backend;
pub mod config;
pub mod demo;
pub mod error;
pub mod guard;
#[cfg(feature = "reqwest")] pub mod http;
pub mod modules;
pub mod obs;
pub mod org;
pub mod route;
pub mod session;
pub mod shell;
pub mod switcher;
pub mod upload;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{OrganizationId, Principal, PrincipalId, Role},
		backend::{MemoryBackend, OrgStore, StoredOrganization},
		config::BackendConfig,
		org::OrganizationResolver,
		shell::DashboardShell,
	};

	/// Builds a principal fixture, panicking on invalid identifiers.
	pub fn principal(id: &str, email: &str) -> Principal {
		let id = PrincipalId::new(id).expect("Principal fixture identifier should be valid.");

		Principal::new(id, email)
	}

	/// Builds an organization identifier fixture.
	pub fn org_id(id: &str) -> OrganizationId {
		OrganizationId::new(id).expect("Organization fixture identifier should be valid.")
	}

	/// Seeds an organization plus a membership for `member` into the in-memory backend.
	pub fn seed_membership(
		backend: &MemoryBackend,
		org: &str,
		name: &str,
		member: &Principal,
		role: Role,
	) -> OrganizationId {
		let id = org_id(org);

		backend.insert_organization_row(StoredOrganization {
			id: id.clone(),
			name: name.into(),
			created_by: member.id.clone(),
		});
		backend.insert_membership_row(id.clone(), member.id.clone(), role);

		id
	}

	/// Configuration pointing at a loopback backend, suitable for mock servers.
	pub fn test_config(base: &str) -> BackendConfig {
		BackendConfig::builder(Url::parse(base).expect("Test backend URL should parse."))
			.anon_key("anon-test-key")
			.build()
			.expect("Test backend configuration should validate.")
	}

	/// Builds an organization resolver wired to an in-memory backend.
	pub fn build_memory_resolver(backend: Arc<MemoryBackend>) -> OrganizationResolver {
		let store: Arc<dyn OrgStore> = backend;

		OrganizationResolver::new(store)
	}

	/// Builds a dashboard shell whose every collaborator is the same in-memory backend.
	pub fn build_memory_shell(backend: Arc<MemoryBackend>) -> DashboardShell {
		DashboardShell::connect(backend, test_config("http://127.0.0.1:54321"))
	}

	#[cfg(feature = "reqwest")]
	/// Builds a reqwest client that accepts the self-signed certificates some mock servers use.
	pub fn test_reqwest_http_client() -> crate::http::ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		crate::http::ReqwestHttpClient::with_client(client)
	}

	#[cfg(feature = "reqwest")]
	/// Constructs a REST backend against `base` using the permissive test transport.
	pub fn build_rest_test_backend(base: &str) -> Arc<crate::backend::RestBackend> {
		Arc::new(crate::backend::RestBackend::with_http_client(
			test_config(base),
			test_reqwest_http_client(),
		))
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, org_gate as _};
