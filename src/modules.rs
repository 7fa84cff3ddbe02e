//! Sidebar modules enabled for an organization.

// self
use crate::{
	_prelude::*,
	auth::OrganizationId,
	backend::{ModuleRow, OrgStore},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Dashboard module known to the shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
	/// Financial management.
	Finance,
	/// Business operations.
	Operations,
	/// Accounting and compliance.
	Accounting,
}
impl ModuleKind {
	/// Every module, in sidebar order.
	pub const ALL: [Self; 3] = [Self::Finance, Self::Operations, Self::Accounting];

	/// Maps a stored module code; `acct` is accepted as an alias for accounting.
	pub fn from_code(code: &str) -> Option<Self> {
		match code.trim().to_ascii_lowercase().as_str() {
			"finance" => Some(Self::Finance),
			"operations" => Some(Self::Operations),
			"accounting" | "acct" => Some(Self::Accounting),
			_ => None,
		}
	}

	/// Sidebar title.
	pub const fn title(self) -> &'static str {
		match self {
			Self::Finance => "Finance",
			Self::Operations => "Operations",
			Self::Accounting => "Accounting",
		}
	}

	/// Sidebar subtitle.
	pub const fn subtitle(self) -> &'static str {
		match self {
			Self::Finance => "Financial Management",
			Self::Operations => "Business Operations",
			Self::Accounting => "Accounting & Compliance",
		}
	}

	/// Dashboard route the entry links to.
	pub const fn route(self) -> &'static str {
		match self {
			Self::Finance => "/dashboard/finance",
			Self::Operations => "/dashboard/operations",
			Self::Accounting => "/dashboard/accounting",
		}
	}
}

/// Sidebar entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleEntry {
	/// Catalog module.
	pub kind: ModuleKind,
	/// Title.
	pub title: &'static str,
	/// Subtitle.
	pub subtitle: &'static str,
	/// Route path.
	pub route: &'static str,
}
impl From<ModuleKind> for ModuleEntry {
	fn from(kind: ModuleKind) -> Self {
		Self { kind, title: kind.title(), subtitle: kind.subtitle(), route: kind.route() }
	}
}

/// Maps module rows through the catalog, dropping unknown codes and duplicates.
pub fn catalog_entries(rows: &[ModuleRow]) -> Vec<ModuleEntry> {
	let mut entries = Vec::<ModuleEntry>::new();

	for kind in rows.iter().filter_map(|row| ModuleKind::from_code(&row.code)) {
		if !entries.iter().any(|entry| entry.kind == kind) {
			entries.push(kind.into());
		}
	}

	entries
}

/// Loads the sidebar entries for `org`. Backend failures yield an empty list.
pub async fn enabled_modules(store: &dyn OrgStore, org: &OrganizationId) -> Vec<ModuleEntry> {
	const KIND: OpKind = OpKind::ModuleLoad;

	let span = OpSpan::new(KIND, "enabled_modules");

	obs::record_op_outcome(KIND, OpOutcome::Attempt);

	match span.instrument(store.enabled_modules(org)).await {
		Ok(rows) => {
			obs::record_op_outcome(KIND, OpOutcome::Success);

			catalog_entries(&rows)
		},
		Err(e) => {
			obs::record_soft_failure(KIND, &e);
			obs::record_op_outcome(KIND, OpOutcome::Failure);

			Vec::new()
		},
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::{
		_preludet::org_id,
		backend::{BackendError, MemoryBackend, Operation},
	};

	fn row(code: &str) -> ModuleRow {
		ModuleRow { code: code.into(), name: None }
	}

	#[test]
	fn catalog_maps_aliases_and_drops_unknown_codes() {
		let rows = [row("acct"), row("payroll"), row("Finance"), row("accounting")];
		let entries = catalog_entries(&rows);

		assert_eq!(
			entries.iter().map(|entry| entry.kind).collect::<Vec<_>>(),
			vec![ModuleKind::Accounting, ModuleKind::Finance]
		);
		assert_eq!(entries[0].route, "/dashboard/accounting");
		assert_eq!(entries[1].subtitle, "Financial Management");
	}

	#[test]
	fn disabled_rows_and_failures_are_hidden() {
		let rt = Runtime::new().expect("Failed to build Tokio runtime for module test.");
		let backend = MemoryBackend::default();
		let org = org_id("org-1");

		backend.set_module(org.clone(), "finance", "Finance", true);
		backend.set_module(org.clone(), "operations", "Operations", false);

		let entries = rt.block_on(enabled_modules(&backend, &org));

		assert_eq!(entries, vec![ModuleEntry::from(ModuleKind::Finance)]);

		backend.fail(Operation::EnabledModules, BackendError::rejected("org_modules missing"));

		assert!(rt.block_on(enabled_modules(&backend, &org)).is_empty());
	}
}
