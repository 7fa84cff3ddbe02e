//! Route surface of the shell: landing page, guarded dashboard, and the catch-all redirect.

// self
use crate::{
	_prelude::*,
	guard::{self, GuardDecision, GuardState, LANDING_PATH},
};

/// Dashboard root path.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// Known route.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Route {
	/// Public landing page at `/`.
	Landing,
	/// Dashboard home at `/dashboard`.
	Dashboard,
	/// Dashboard sub-page at `/dashboard/<section>`.
	DashboardSection(String),
}
impl Route {
	/// Parses a path, ignoring query, fragment, and trailing slashes. Unknown paths and
	/// sections with empty segments yield `None`.
	pub fn parse(path: &str) -> Option<Self> {
		let path = path.split(['?', '#']).next().unwrap_or_default();
		let trimmed = path.trim_end_matches('/');

		match trimmed {
			"" => Some(Self::Landing),
			DASHBOARD_PATH => Some(Self::Dashboard),
			_ => {
				let section = trimmed.strip_prefix(DASHBOARD_PATH)?.strip_prefix('/')?;

				if section.split('/').any(str::is_empty) {
					None
				} else {
					Some(Self::DashboardSection(section.to_owned()))
				}
			},
		}
	}

	/// Canonical path for the route.
	pub fn path(&self) -> String {
		match self {
			Self::Landing => LANDING_PATH.into(),
			Self::Dashboard => DASHBOARD_PATH.into(),
			Self::DashboardSection(section) => format!("{DASHBOARD_PATH}/{section}"),
		}
	}

	/// `true` for routes behind the guard.
	pub fn is_guarded(&self) -> bool {
		!matches!(self, Self::Landing)
	}
}
impl Display for Route {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.path())
	}
}

/// Navigation result for a requested path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
	/// Render the route.
	Render(Route),
	/// Navigate elsewhere.
	Redirect(String),
	/// Render a loading placeholder.
	Placeholder,
}

/// Resolves `path` against the session loading flag and the current guard state.
pub fn navigate(
	path: &str,
	session_loading: bool,
	signed_in: bool,
	state: GuardState,
) -> Navigation {
	let Some(route) = Route::parse(path) else {
		return Navigation::Redirect(LANDING_PATH.into());
	};

	if !route.is_guarded() {
		return landing(session_loading, signed_in, state);
	}

	match guard::decide(state) {
		GuardDecision::Placeholder => Navigation::Placeholder,
		GuardDecision::Redirect(target) => Navigation::Redirect(target.into()),
		GuardDecision::Render => Navigation::Render(route),
	}
}

/// Signed-in visitors without a usable organization stay on the landing page so the guard's
/// redirect does not loop.
fn landing(session_loading: bool, signed_in: bool, state: GuardState) -> Navigation {
	if session_loading {
		return Navigation::Placeholder;
	}
	if !signed_in {
		return Navigation::Render(Route::Landing);
	}

	match state {
		GuardState::Authorized => Navigation::Redirect(DASHBOARD_PATH.into()),
		GuardState::Pending => Navigation::Placeholder,
		GuardState::Unauthenticated | GuardState::NoOrg | GuardState::Forbidden =>
			Navigation::Render(Route::Landing),
	}
}
