//! CSV uploads into the current organization's storage prefix.

// crates.io
use time::{UtcOffset, format_description::BorrowedFormatItem, macros::format_description};
// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, Principal, PrincipalId},
	backend::{BackendError, ObjectStorage, RecordStore, UploadOptions},
	config::BackendConfig,
	error::ValidationError,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// MIME type stored for every upload.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

const OBJECT_TIMESTAMP: &[BorrowedFormatItem<'static>] =
	format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]-[subsecond digits:3]Z");

/// File picked for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvFile {
	/// Original file name.
	pub name: String,
	/// MIME type reported by the picker, if any.
	pub content_type: Option<String>,
	/// File contents.
	pub bytes: Vec<u8>,
}
impl CsvFile {
	/// Creates a file without a reported MIME type.
	pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
		Self { name: name.into(), content_type: None, bytes: bytes.into() }
	}

	/// Sets the reported MIME type.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}

	/// Size in bytes.
	pub fn size(&self) -> u64 {
		self.bytes.len() as u64
	}

	/// Checks the file type and size against `limit`.
	pub fn validate(&self, limit: u64) -> Result<(), ValidationError> {
		let by_name = self.name.to_ascii_lowercase().ends_with(".csv");
		let by_type = self
			.content_type
			.as_deref()
			.is_some_and(|ty| ty.eq_ignore_ascii_case(CSV_CONTENT_TYPE));

		if !by_name && !by_type {
			return Err(ValidationError::NotCsv);
		}
		if self.size() > limit {
			return Err(ValidationError::FileTooLarge { limit });
		}

		Ok(())
	}

	/// File name without any directory components.
	fn base_name(&self) -> &str {
		self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name)
	}
}

/// `files_uploaded` row written after the object is stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
	/// Organization the file belongs to.
	pub org_id: OrganizationId,
	/// Uploader.
	pub user_id: PrincipalId,
	/// Original file name.
	pub filename: String,
	/// Object path inside the bucket.
	pub file_path: String,
	/// Size in bytes.
	pub file_size: u64,
	/// Stored MIME type.
	pub file_type: String,
	/// Public URL of the object.
	pub storage_url: Url,
	/// Upload instant.
	#[serde(with = "time::serde::rfc3339")]
	pub uploaded_at: OffsetDateTime,
}

/// Builds `{org}/{user}/{timestamp}_{file_name}` for an upload at `instant`.
pub fn object_path(
	org: &OrganizationId,
	user: &PrincipalId,
	file_name: &str,
	instant: OffsetDateTime,
) -> Result<String, BackendError> {
	let timestamp = instant.to_offset(UtcOffset::UTC).format(OBJECT_TIMESTAMP).map_err(|e| {
		BackendError::Serialization {
			message: format!("Upload timestamp cannot be formatted: {e}"),
		}
	})?;

	Ok(format!("{org}/{user}/{timestamp}_{file_name}"))
}

/// Uploads CSV files and records them in `files_uploaded`.
#[derive(Clone)]
pub struct CsvUploader {
	storage: Arc<dyn ObjectStorage>,
	records: Arc<dyn RecordStore>,
	bucket: String,
	limit: u64,
	cache_control_secs: u32,
}
impl CsvUploader {
	/// Creates an uploader using the bucket and limits from `config`.
	pub fn new(
		storage: Arc<dyn ObjectStorage>,
		records: Arc<dyn RecordStore>,
		config: &BackendConfig,
	) -> Self {
		Self {
			storage,
			records,
			bucket: config.storage_bucket.clone(),
			limit: config.upload_limit_bytes,
			cache_control_secs: config.upload_cache_control_secs,
		}
	}

	/// Largest accepted file in bytes.
	pub fn limit(&self) -> u64 {
		self.limit
	}

	/// Uploads `file` for `principal` into `organization`.
	///
	/// Requires both a principal and a current organization. Every failure, including the
	/// record insert after a successful object upload, is returned without retry.
	pub async fn upload(
		&self,
		principal: Option<&Principal>,
		organization: Option<&OrganizationId>,
		file: CsvFile,
	) -> Result<FileRecord> {
		const KIND: OpKind = OpKind::Upload;

		let principal = principal.ok_or(Error::NotAuthenticated)?;
		let organization = organization.ok_or(Error::NoOrganizationSelected)?;

		file.validate(self.limit)?;

		let span = OpSpan::new(KIND, "upload");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let now = OffsetDateTime::now_utc();
				let filename = file.base_name().to_owned();
				let file_size = file.size();
				let file_path = object_path(organization, &principal.id, &filename, now)?;
				let options = UploadOptions {
					cache_control_secs: self.cache_control_secs,
					upsert: false,
					content_type: CSV_CONTENT_TYPE.into(),
				};

				self.storage.upload(&self.bucket, &file_path, file.bytes, &options).await?;

				let storage_url = self.storage.public_url(&self.bucket, &file_path)?;
				let record = FileRecord {
					org_id: organization.clone(),
					user_id: principal.id.clone(),
					filename,
					file_path,
					file_size,
					file_type: CSV_CONTENT_TYPE.into(),
					storage_url,
					uploaded_at: now,
				};

				self.records.insert_file_record(record.clone()).await?;

				Ok(record)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}
}
impl Debug for CsvUploader {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CsvUploader")
			.field("bucket", &self.bucket)
			.field("limit", &self.limit)
			.field("cache_control_secs", &self.cache_control_secs)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::{
		_preludet::{org_id, principal, test_config},
		backend::{MemoryBackend, Operation},
	};

	fn uploader(backend: &Arc<MemoryBackend>, limit: u64) -> CsvUploader {
		let mut config = test_config("http://127.0.0.1:54321");

		config.upload_limit_bytes = limit;

		CsvUploader::new(backend.clone(), backend.clone(), &config)
	}

	#[test]
	fn validation_accepts_name_or_type() {
		assert_eq!(CsvFile::new("report.CSV", "a,b").validate(10), Ok(()));
		let labelled = CsvFile::new("report", "a,b").with_content_type("text/csv");

		assert_eq!(labelled.validate(10), Ok(()));
		assert_eq!(CsvFile::new("report.xlsx", "a,b").validate(10), Err(ValidationError::NotCsv));
		assert_eq!(
			CsvFile::new("big.csv", vec![b'x'; 11]).validate(10),
			Err(ValidationError::FileTooLarge { limit: 10 })
		);
	}

	#[test]
	fn object_paths_use_dashed_utc_timestamps() {
		let instant = macros::datetime!(2025-03-04 05:06:07.089 +02:00);
		let user = principal("u1", "u1@acme.io");
		let path = object_path(&org_id("org-1"), &user.id, "sales.csv", instant)
			.expect("Timestamp should format.");

		assert_eq!(path, "org-1/u1/2025-03-04T03-06-07-089Z_sales.csv");
	}

	#[test]
	fn upload_requires_principal_and_organization() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for upload test.");
		let backend = Arc::new(MemoryBackend::default());
		let uploader = uploader(&backend, 1024);
		let user = principal("u1", "u1@acme.io");

		assert!(matches!(
			rt.block_on(uploader.upload(None, Some(&org_id("org-1")), CsvFile::new("a.csv", "x"))),
			Err(Error::NotAuthenticated)
		));
		assert!(matches!(
			rt.block_on(uploader.upload(Some(&user), None, CsvFile::new("a.csv", "x"))),
			Err(Error::NoOrganizationSelected)
		));
		assert_eq!(backend.calls(Operation::Upload), 0);
	}

	#[test]
	fn upload_stores_object_and_record() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for upload test.");
		let backend = Arc::new(MemoryBackend::default());
		let uploader = uploader(&backend, 1024);
		let user = principal("u1", "u1@acme.io");
		let org = org_id("org-1");
		let record = rt
			.block_on(uploader.upload(
				Some(&user),
				Some(&org),
				CsvFile::new("sales.csv", "a,b\n1,2"),
			))
			.expect("Upload should succeed.");
		let object = backend
			.object("csv-uploads", &record.file_path)
			.expect("Object should be stored under the generated path.");

		assert!(record.file_path.starts_with("org-1/u1/"));
		assert!(record.file_path.ends_with("_sales.csv"));
		assert_eq!(record.file_size, 7);
		assert_eq!(object.options.cache_control_secs, 3600);
		assert!(!object.options.upsert);
		assert!(
			record
				.storage_url
				.as_str()
				.starts_with("http://127.0.0.1:54321/storage/v1/object/public/csv-uploads/org-1/u1/")
		);
		assert_eq!(backend.files_table(), vec![record]);
	}

	#[test]
	fn record_failures_are_returned() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for upload test.");
		let backend = Arc::new(MemoryBackend::default());
		let uploader = uploader(&backend, 1024);
		let user = principal("u1", "u1@acme.io");

		backend.fail(Operation::InsertFileRecord, BackendError::rejected("files_uploaded missing"));

		let err = rt
			.block_on(uploader.upload(
				Some(&user),
				Some(&org_id("org-1")),
				CsvFile::new("a.csv", "x"),
			))
			.expect_err("Record insert failures should surface.");

		assert!(matches!(err, Error::Backend(BackendError::Rejected { .. })));
		assert_eq!(backend.calls(Operation::InsertFileRecord), 1);
	}
}
