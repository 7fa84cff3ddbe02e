//! Optional observability helpers for dashboard operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `org_gate.op` with the `op` and `stage`
//!   fields, plus warn-level events for failures the dashboard swallows (org list loads, module
//!   lookups, profile capture).
//! - Enable `metrics` to increment the `org_gate_op_total` counter for every
//!   attempt/success/failure/superseded outcome, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the dashboard core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Session restore at startup.
	SessionRestore,
	/// Password sign-in.
	SignIn,
	/// Account creation.
	SignUp,
	/// Sign-out.
	SignOut,
	/// Organization list load.
	OrgLoad,
	/// Organization creation.
	OrgCreate,
	/// Current organization switch.
	OrgSwitch,
	/// Enabled module lookup.
	ModuleLoad,
	/// CSV upload.
	Upload,
	/// Demo request submission.
	DemoRequest,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::SessionRestore => "session_restore",
			OpKind::SignIn => "sign_in",
			OpKind::SignUp => "sign_up",
			OpKind::SignOut => "sign_out",
			OpKind::OrgLoad => "org_load",
			OpKind::OrgCreate => "org_create",
			OpKind::OrgSwitch => "org_switch",
			OpKind::ModuleLoad => "module_load",
			OpKind::Upload => "upload",
			OpKind::DemoRequest => "demo_request",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure returned to the caller or degraded to an empty state.
	Failure,
	/// Response discarded because a newer request or a teardown superseded it.
	Superseded,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::Superseded => "superseded",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
