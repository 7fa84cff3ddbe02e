//! Strongly typed identifiers for principals and organizations.
//!
//! Both kinds share one validated representation, [`Id`], tagged with a marker so a principal id
//! can never be passed where an organization id is expected. Ids also become storage path
//! segments (`<org>/<user>/<file>`), so a `/` is rejected alongside whitespace.

// std
use std::{
	borrow::Borrow,
	cmp::Ordering,
	hash::{Hash, Hasher},
	marker::PhantomData,
	ops::Deref,
};
// crates.io
use serde::{Deserializer, Serializer, de::Error as _};
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;

/// Marker describing one identifier kind.
pub trait IdKind {
	/// Label used in `Debug` output and validation errors.
	const LABEL: &'static str;
}

/// Marker for identity provider user ids.
#[derive(Debug)]
pub enum PrincipalKind {}
impl IdKind for PrincipalKind {
	const LABEL: &'static str = "Principal";
}

/// Marker for organization (tenant workspace) ids.
#[derive(Debug)]
pub enum OrganizationKind {}
impl IdKind for OrganizationKind {
	const LABEL: &'static str = "Organization";
}

/// Opaque identity id issued by the identity provider.
pub type PrincipalId = Id<PrincipalKind>;
/// Unique identifier for an organization.
pub type OrganizationId = Id<OrganizationKind>;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (principal, organization).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (principal, organization).
		kind: &'static str,
	},
	/// The identifier contains a `/` and cannot be used as a storage path segment.
	#[error("{kind} identifier contains a path separator.")]
	ContainsSeparator {
		/// Kind of identifier (principal, organization).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed byte length.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Kind of identifier (principal, organization).
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

/// Validated identifier of kind `K`.
pub struct Id<K> {
	value: String,
	kind: PhantomData<fn() -> K>,
}
impl<K> Id<K>
where
	K: IdKind,
{
	/// Creates a new identifier after validation.
	pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
		let value = value.into();

		check::<K>(&value)?;

		Ok(Self { value, kind: PhantomData })
	}

	/// Builds `<prefix>-<n>` for locally minted ids; `prefix` must be a valid id on its own.
	pub(crate) fn sequential(prefix: &'static str, n: u64) -> Self {
		Self { value: format!("{prefix}-{n}"), kind: PhantomData }
	}

	/// Borrowed view of the raw id.
	pub fn as_str(&self) -> &str {
		&self.value
	}
}
impl<K> Clone for Id<K> {
	fn clone(&self) -> Self {
		Self { value: self.value.clone(), kind: PhantomData }
	}
}
impl<K> PartialEq for Id<K> {
	fn eq(&self, other: &Self) -> bool {
		self.value == other.value
	}
}
impl<K> Eq for Id<K> {}
impl<K> PartialOrd for Id<K> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl<K> Ord for Id<K> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.value.cmp(&other.value)
	}
}
// Must hash exactly like `str` for `Borrow<str>` lookups.
impl<K> Hash for Id<K> {
	fn hash<H>(&self, state: &mut H)
	where
		H: Hasher,
	{
		self.value.as_str().hash(state);
	}
}
impl<K> Deref for Id<K> {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.value
	}
}
impl<K> AsRef<str> for Id<K> {
	fn as_ref(&self) -> &str {
		&self.value
	}
}
impl<K> Borrow<str> for Id<K> {
	fn borrow(&self) -> &str {
		&self.value
	}
}
impl<K> From<Id<K>> for String {
	fn from(id: Id<K>) -> Self {
		id.value
	}
}
impl<K> TryFrom<String> for Id<K>
where
	K: IdKind,
{
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl<K> FromStr for Id<K>
where
	K: IdKind,
{
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl<K> Debug for Id<K>
where
	K: IdKind,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}({})", K::LABEL, self.value)
	}
}
impl<K> Display for Id<K> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.value)
	}
}
impl<K> Serialize for Id<K> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.value)
	}
}
impl<'de, K> Deserialize<'de> for Id<K>
where
	K: IdKind,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		Self::new(raw).map_err(D::Error::custom)
	}
}

fn check<K>(value: &str) -> Result<(), IdentifierError>
where
	K: IdKind,
{
	let kind = K::LABEL;

	if value.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if value.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if value.contains('/') {
		return Err(IdentifierError::ContainsSeparator { kind });
	}
	if value.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
