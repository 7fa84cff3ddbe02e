//! Demonstrates the dashboard shell over the REST backend: sign in, resolve the organization
//! context, gate the dashboard route, and list the sidebar modules.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use org_gate::{
	auth::Secret,
	backend::RestBackend,
	config::BackendConfig,
	http::ReqwestHttpClient,
	reqwest::Client,
	shell::DashboardShell,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/v1/token").query_param("grant_type", "password");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "demo-access",
				"refresh_token": "demo-refresh",
				"expires_in": 3600,
				"user": { "id": "user-demo", "email": "demo@acme.io" }
			}));
		})
		.await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/rest/v1/org_members");
			then.status(200).header("content-type", "application/json").json_body(json!([
				{ "org_id": "org-acme", "role": "owner", "user_id": "user-demo" },
				{ "org_id": "org-globex", "role": "member", "user_id": "user-demo" }
			]));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/rest/v1/organizations");
			then.status(200).header("content-type", "application/json").json_body(json!([
				{ "id": "org-acme", "name": "Acme" },
				{ "id": "org-globex", "name": "Globex" }
			]));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/rest/v1/org_modules");
			then.status(200).header("content-type", "application/json").json_body(json!([
				{ "enabled": true, "modules": { "code": "finance", "name": "Finance" } },
				{ "enabled": true, "modules": { "code": "operations", "name": "Operations" } }
			]));
		})
		.await;

	let config = BackendConfig::builder(Url::parse(&server.base_url())?)
		.anon_key("demo-anon-key")
		.build()?;
	let http_client = ReqwestHttpClient::with_client(Client::builder().build()?);
	let backend = Arc::new(RestBackend::with_http_client(config.clone(), http_client));
	let shell = DashboardShell::connect(backend, config);

	shell.init().await;

	let principal = shell.sign_in("demo@acme.io", &Secret::new("demo-password")).await?;

	println!("Signed in as {}.", principal.email);
	println!("Guard state: {:?}.", shell.guard_state());

	if let Some(view) = shell.switcher() {
		for option in &view.options {
			let marker = if option.selected { "*" } else { " " };

			println!("{marker} {} ({}).", option.name, option.role);
		}
	}

	for entry in shell.enabled_modules().await {
		println!("Module {}: {} -> {}.", entry.title, entry.subtitle, entry.route);
	}

	println!("Navigating to /: {:?}.", shell.navigate("/"));

	token_mock.assert_async().await;

	Ok(())
}
