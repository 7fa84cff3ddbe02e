//! Demo request form submitted from the landing page.

// self
use crate::{
	_prelude::*,
	backend::RecordStore,
	error::ValidationError,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Validated `demo_requests` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoRequest {
	/// Given name.
	pub first_name: String,
	/// Family name.
	pub last_name: String,
	/// Contact email.
	pub email: String,
	/// Company the request is for.
	pub company_name: String,
}
impl DemoRequest {
	/// Trims and validates the form fields.
	pub fn new(
		first_name: &str,
		last_name: &str,
		email: &str,
		company_name: &str,
	) -> Result<Self, ValidationError> {
		let first_name = required("first name", first_name)?;
		let last_name = required("last name", last_name)?;
		let email = required("email", email)?;
		let company_name = required("company name", company_name)?;

		if !email.contains('@') {
			return Err(ValidationError::InvalidEmail { email });
		}

		Ok(Self { first_name, last_name, email, company_name })
	}
}

/// Stores a demo request. Failures are returned without retry.
pub async fn submit_demo_request(records: &dyn RecordStore, request: DemoRequest) -> Result<()> {
	const KIND: OpKind = OpKind::DemoRequest;

	let span = OpSpan::new(KIND, "submit_demo_request");

	obs::record_op_outcome(KIND, OpOutcome::Attempt);

	let result = span.instrument(records.insert_demo_request(request)).await.map_err(Error::from);

	match &result {
		Ok(()) => obs::record_op_outcome(KIND, OpOutcome::Success),
		Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
	}

	result
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
	let value = value.trim();

	if value.is_empty() { Err(ValidationError::Required { field }) } else { Ok(value.to_owned()) }
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::backend::{BackendError, MemoryBackend, Operation};

	#[test]
	fn fields_are_trimmed_and_checked() {
		let request = DemoRequest::new(" Ada ", "Lovelace", "ada@acme.io ", "Acme")
			.expect("Complete form should validate.");

		assert_eq!(request.first_name, "Ada");
		assert_eq!(request.email, "ada@acme.io");
		assert_eq!(
			DemoRequest::new("Ada", "  ", "ada@acme.io", "Acme"),
			Err(ValidationError::Required { field: "last name" })
		);
		assert_eq!(
			DemoRequest::new("Ada", "Lovelace", "ada.acme.io", "Acme"),
			Err(ValidationError::InvalidEmail { email: "ada.acme.io".into() })
		);
	}

	#[test]
	fn submission_failures_surface() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for demo request test.");
		let backend = MemoryBackend::default();
		let request = DemoRequest::new("Ada", "Lovelace", "ada@acme.io", "Acme")
			.expect("Complete form should validate.");

		rt.block_on(submit_demo_request(&backend, request.clone()))
			.expect("Insert should succeed.");

		assert_eq!(backend.demo_requests_table(), vec![request.clone()]);

		backend.fail(Operation::InsertDemoRequest, BackendError::rejected("rate limited"));

		assert!(matches!(
			rt.block_on(submit_demo_request(&backend, request)),
			Err(Error::Backend(BackendError::Rejected { .. }))
		));
		assert_eq!(backend.calls(Operation::InsertDemoRequest), 2);
	}
}
