//! Transport primitives shared by the REST backend.
//!
//! [`ReqwestHttpClient`] is the only dependency the crate has on an HTTP stack. The helpers
//! here execute prepared requests, decode JSON bodies with field-path aware errors, and
//! normalize the backend's several error payload shapes (gateway, auth, table API, storage)
//! into [`BackendError`].

// std
use std::ops::Deref;
// crates.io
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, backend::BackendError};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl Debug for ReqwestHttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ReqwestHttpClient(..)")
	}
}

/// Raw response captured after a successful status.
#[derive(Debug)]
pub(crate) struct RawResponse {
	pub(crate) status: StatusCode,
	pub(crate) body: Vec<u8>,
}

/// Sends the request; non-2xx statuses become [`BackendError::Rejected`].
pub(crate) async fn execute(request: RequestBuilder) -> Result<RawResponse, BackendError> {
	let response = request.send().await.map_err(transport_error)?;
	let status = response.status();
	let body = response.bytes().await.map_err(transport_error)?.to_vec();

	if status.is_success() {
		Ok(RawResponse { status, body })
	} else {
		Err(map_error_response(status.as_u16(), &body))
	}
}

/// Decodes a JSON body, naming the offending field on failure.
pub(crate) fn decode<T>(response: &RawResponse) -> Result<T, BackendError>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_slice(&response.body);

	serde_path_to_error::deserialize(de).map_err(|e| BackendError::Serialization {
		message: format!("Response with status {} is malformed: {e}", response.status.as_u16()),
	})
}

fn transport_error(e: ReqwestError) -> BackendError {
	BackendError::Transport { message: e.to_string() }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
	code: Option<serde_json::Value>,
	error_code: Option<String>,
	message: Option<String>,
	msg: Option<String>,
	error: Option<String>,
	error_description: Option<String>,
}
impl ErrorBody {
	fn code(&self) -> Option<String> {
		match &self.code {
			Some(serde_json::Value::String(code)) => Some(code.clone()),
			Some(serde_json::Value::Number(code)) => Some(code.to_string()),
			_ => self.error_code.clone().or_else(|| self.error.clone()),
		}
	}

	fn message(&self) -> Option<String> {
		self.message
			.clone()
			.or_else(|| self.msg.clone())
			.or_else(|| self.error_description.clone())
			.or_else(|| self.error.clone())
	}
}

/// Normalizes an error payload into [`BackendError::Rejected`].
pub(crate) fn map_error_response(status: u16, body: &[u8]) -> BackendError {
	let parsed = serde_json::from_slice::<ErrorBody>(body).unwrap_or_default();
	let message = parsed.message().unwrap_or_else(|| {
		let text = String::from_utf8_lossy(body);
		let text = text.trim();

		if text.is_empty() { format!("HTTP {status}") } else { truncate_preview(text) }
	});

	BackendError::Rejected { status: Some(status), code: parsed.code(), message }
}

fn truncate_preview(body: &str) -> String {
	if body.chars().count() <= BODY_PREVIEW_LIMIT {
		return body.to_owned();
	}

	let mut buf = body.chars().take(BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}
