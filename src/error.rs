//! Crate-level error types shared across providers, backends, and the dashboard shell.

// self
use crate::{_prelude::*, auth::OrganizationId, backend::BackendError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Backend rejected or failed a request.
	#[error("{0}")]
	Backend(
		#[from]
		#[source]
		BackendError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// User-supplied input failed validation before reaching the backend.
	#[error(transparent)]
	Validation(#[from] ValidationError),

	/// Identity provider refused the credentials or the account request.
	#[error("Authentication failed: {reason}.")]
	Auth {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Operation requires a signed-in principal.
	#[error("No principal is signed in.")]
	NotAuthenticated,
	/// Operation requires a current organization.
	#[error("No organization is selected.")]
	NoOrganizationSelected,
	/// Selected organization is not part of the principal's loaded organizations.
	#[error("Principal is not a member of organization `{organization}`.")]
	NotAMember {
		/// Organization that was requested.
		organization: OrganizationId,
	},
	/// Membership insert failed after the organization row was created; the row was removed.
	#[error("Organization `{organization}` was rolled back because the owner membership could not be stored.")]
	MembershipRolledBack {
		/// Organization that was created and deleted again.
		organization: OrganizationId,
		/// Failure reported by the membership insert.
		#[source]
		source: BackendError,
	},
	/// Membership insert failed and the compensating delete failed too.
	#[error("Organization `{organization}` has no members and could not be removed: {cleanup}.")]
	OrphanedOrganization {
		/// Organization row left without members.
		organization: OrganizationId,
		/// Failure reported by the compensating delete.
		cleanup: BackendError,
		/// Failure reported by the membership insert.
		#[source]
		source: BackendError,
	},
	/// Provider context was torn down and no longer accepts mutations.
	#[error("Context has been torn down.")]
	TornDown,
}

/// Configuration and validation failures raised while wiring backends.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Configuration document is malformed.
	#[error("Configuration could not be parsed: {source}.")]
	Parse {
		/// Structured parsing failure naming the offending field.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Backend URL cannot be parsed.
	#[error("Backend URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Backend URL uses plain HTTP on a non-loopback host.
	#[error("The backend URL must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// URL that failed validation.
		url: String,
	},
	/// Anonymous API key is empty.
	#[error("Backend anonymous key is missing.")]
	MissingAnonKey,
	/// Storage bucket name is empty or contains a path separator.
	#[error("Storage bucket `{bucket}` is invalid.")]
	InvalidBucket {
		/// Bucket name that failed validation.
		bucket: String,
	},
	/// Upload size limit must be positive.
	#[error("Upload size limit must be greater than zero.")]
	InvalidUploadLimit,
	/// Required environment variable is not set.
	#[error("Environment variable `{name}` is not set.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Input validation failures surfaced inline to the user.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// A required field was empty after trimming.
	#[error("The {field} field is required.")]
	Required {
		/// Field label.
		field: &'static str,
	},
	/// Email address is malformed.
	#[error("Email address `{email}` is invalid.")]
	InvalidEmail {
		/// Rejected address.
		email: String,
	},
	/// Upload is not a CSV file.
	#[error("Please select a valid CSV file.")]
	NotCsv,
	/// Upload exceeds the configured size limit.
	#[error("File size must be less than {limit} bytes.")]
	FileTooLarge {
		/// Maximum permitted size in bytes.
		limit: u64,
	},
	/// An identifier received from the user or backend is malformed.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn backend_error_converts_with_source() {
		let backend = BackendError::Rejected {
			status: Some(500),
			code: None,
			message: "database unreachable".into(),
		};
		let error: Error = backend.clone().into();

		assert!(matches!(error, Error::Backend(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original backend error as its source.");

		assert_eq!(source.to_string(), backend.to_string());
	}

	#[test]
	fn orphan_error_names_both_failures() {
		let error = Error::OrphanedOrganization {
			organization: OrganizationId::new("org-9").expect("Fixture id should be valid."),
			cleanup: BackendError::Transport { message: "reset by peer".into() },
			source: BackendError::Rejected {
				status: Some(403),
				code: Some("42501".into()),
				message: "row-level security".into(),
			},
		};
		let rendered = error.to_string();

		assert!(rendered.contains("org-9"));
		assert!(rendered.contains("reset by peer"));
		assert!(
			StdError::source(&error)
				.expect("Orphan error should expose the membership failure.")
				.to_string()
				.contains("row-level security")
		);
	}
}
