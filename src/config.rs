//! Backend configuration with validation, JSON loading, and environment overrides.

// std
use std::{env, net::IpAddr};
// self
use crate::{_prelude::*, auth::Secret, error::ConfigError};

/// What `create_organization` may do when the atomic procedure is unavailable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationFallback {
	/// Return the missing procedure as an error.
	Disabled,
	/// Insert the organization and owner membership separately, deleting the organization
	/// again when the membership insert fails.
	#[default]
	Compensating,
}

/// Connection and policy settings for the hosted backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
	/// Project base URL; always normalized to end with `/`.
	pub url: Url,
	/// Public anonymous API key sent with every request.
	pub anon_key: Secret,
	/// Bucket CSV uploads land in.
	#[serde(default = "BackendConfig::default_bucket")]
	pub storage_bucket: String,
	/// Largest accepted upload in bytes.
	#[serde(default = "BackendConfig::default_upload_limit")]
	pub upload_limit_bytes: u64,
	/// `Cache-Control` max-age applied to uploaded objects.
	#[serde(default = "BackendConfig::default_cache_control")]
	pub upload_cache_control_secs: u32,
	/// Organization creation fallback policy.
	#[serde(default)]
	pub creation_fallback: CreationFallback,
}
impl BackendConfig {
	/// Default upload bucket.
	pub const DEFAULT_BUCKET: &'static str = "csv-uploads";
	/// Default cache max-age for uploads (one hour).
	pub const DEFAULT_CACHE_CONTROL_SECS: u32 = 3600;
	/// Default upload limit (10 MiB).
	pub const DEFAULT_UPLOAD_LIMIT: u64 = 10 * 1024 * 1024;
	/// Variable holding the anonymous key for [`BackendConfig::from_env`].
	pub const ENV_ANON_KEY: &'static str = "ORG_GATE_ANON_KEY";
	/// Optional variable overriding the storage bucket for [`BackendConfig::from_env`].
	pub const ENV_BUCKET: &'static str = "ORG_GATE_BUCKET";
	/// Variable holding the backend URL for [`BackendConfig::from_env`].
	pub const ENV_URL: &'static str = "ORG_GATE_URL";

	/// Creates a builder seeded with the backend URL.
	pub fn builder(url: Url) -> BackendConfigBuilder {
		BackendConfigBuilder::new(url)
	}

	/// Parses and validates a JSON document.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let config: Self =
			serde_path_to_error::deserialize(de).map_err(|source| ConfigError::Parse { source })?;

		config.normalized()
	}

	/// Reads `ORG_GATE_URL`, `ORG_GATE_ANON_KEY`, and optionally `ORG_GATE_BUCKET`.
	pub fn from_env() -> Result<Self, ConfigError> {
		let url = read_env(Self::ENV_URL)?;
		let url = Url::parse(&url).map_err(|source| ConfigError::InvalidUrl { source })?;
		let mut builder = Self::builder(url).anon_key(read_env(Self::ENV_ANON_KEY)?);

		if let Ok(bucket) = env::var(Self::ENV_BUCKET) {
			builder = builder.storage_bucket(bucket);
		}

		builder.build()
	}

	fn default_bucket() -> String {
		Self::DEFAULT_BUCKET.into()
	}

	fn default_upload_limit() -> u64 {
		Self::DEFAULT_UPLOAD_LIMIT
	}

	fn default_cache_control() -> u32 {
		Self::DEFAULT_CACHE_CONTROL_SECS
	}

	fn normalized(mut self) -> Result<Self, ConfigError> {
		if !self.url.path().ends_with('/') {
			let path = format!("{}/", self.url.path());

			self.url.set_path(&path);
		}

		self.validate()?;

		Ok(self)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		validate_url(&self.url)?;

		if self.anon_key.is_blank() {
			return Err(ConfigError::MissingAnonKey);
		}
		if self.storage_bucket.trim().is_empty() || self.storage_bucket.contains('/') {
			return Err(ConfigError::InvalidBucket { bucket: self.storage_bucket.clone() });
		}
		if self.upload_limit_bytes == 0 {
			return Err(ConfigError::InvalidUploadLimit);
		}

		Ok(())
	}
}

/// Builder for [`BackendConfig`] values.
#[derive(Debug)]
pub struct BackendConfigBuilder {
	url: Url,
	anon_key: Option<Secret>,
	storage_bucket: String,
	upload_limit_bytes: u64,
	upload_cache_control_secs: u32,
	creation_fallback: CreationFallback,
}
impl BackendConfigBuilder {
	/// Creates a builder with defaults for everything but the URL.
	pub fn new(url: Url) -> Self {
		Self {
			url,
			anon_key: None,
			storage_bucket: BackendConfig::default_bucket(),
			upload_limit_bytes: BackendConfig::DEFAULT_UPLOAD_LIMIT,
			upload_cache_control_secs: BackendConfig::DEFAULT_CACHE_CONTROL_SECS,
			creation_fallback: CreationFallback::default(),
		}
	}

	/// Sets the anonymous API key.
	pub fn anon_key(mut self, key: impl Into<Secret>) -> Self {
		self.anon_key = Some(key.into());

		self
	}

	/// Overrides the upload bucket.
	pub fn storage_bucket(mut self, bucket: impl Into<String>) -> Self {
		self.storage_bucket = bucket.into();

		self
	}

	/// Overrides the upload size limit.
	pub fn upload_limit_bytes(mut self, limit: u64) -> Self {
		self.upload_limit_bytes = limit;

		self
	}

	/// Overrides the upload cache max-age.
	pub fn upload_cache_control_secs(mut self, secs: u32) -> Self {
		self.upload_cache_control_secs = secs;

		self
	}

	/// Overrides the organization creation fallback policy.
	pub fn creation_fallback(mut self, fallback: CreationFallback) -> Self {
		self.creation_fallback = fallback;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<BackendConfig, ConfigError> {
		let anon_key = self.anon_key.ok_or(ConfigError::MissingAnonKey)?;

		BackendConfig {
			url: self.url,
			anon_key,
			storage_bucket: self.storage_bucket,
			upload_limit_bytes: self.upload_limit_bytes,
			upload_cache_control_secs: self.upload_cache_control_secs,
			creation_fallback: self.creation_fallback,
		}
		.normalized()
	}
}

fn read_env(name: &'static str) -> Result<String, ConfigError> {
	env::var(name).map_err(|_| ConfigError::MissingEnv { name })
}

fn validate_url(url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.is_ok_and(|ip| ip.is_loopback()),
		None => false,
	}
}
