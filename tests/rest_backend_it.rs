// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use org_gate::{
	_preludet::*,
	auth::{Role, Secret, Session},
	backend::{
		BackendError, IdentityProvider, Membership, ObjectStorage, OrgStore, OrganizationRow,
		UploadOptions,
	},
	config::CreationFallback,
	modules::{self, ModuleKind},
	org::OrganizationResolver,
};

const ANON_BEARER: &str = "Bearer anon-test-key";

fn token_body(user: &str, access: &str) -> serde_json::Value {
	json!({
		"access_token": access,
		"refresh_token": format!("refresh-{user}"),
		"expires_in": 3600,
		"token_type": "bearer",
		"user": { "id": user, "email": format!("{user}@acme.io") }
	})
}

#[tokio::test]
async fn password_sign_in_stores_the_session_and_authenticates_later_calls() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/v1/token")
				.query_param("grant_type", "password")
				.header("apikey", "anon-test-key")
				.header("authorization", ANON_BEARER)
				.json_body(json!({ "email": "u1@acme.io", "password": "pw" }));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(token_body("u1", "access-u1"));
		})
		.await;
	let members_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/rest/v1/org_members")
				.query_param("select", "org_id,role,user_id")
				.query_param("user_id", "eq.u1")
				.header("apikey", "anon-test-key")
				.header("authorization", "Bearer access-u1");
			then.status(200).header("content-type", "application/json").json_body(json!([
				{ "org_id": "org-a", "role": "owner", "user_id": "u1" },
				{ "org_id": "org-b", "role": "billing", "user_id": "u1" }
			]));
		})
		.await;
	let session = backend
		.sign_in_with_password("u1@acme.io", &Secret::new("pw"))
		.await
		.expect("Password grant should succeed against the mock server.");

	assert_eq!(session.principal, principal("u1", "u1@acme.io"));
	assert_eq!(session.refresh_token, Some(Secret::new("refresh-u1")));
	assert!(session.expires_at.is_some());
	assert_eq!(backend.current_session(), Some(session.clone()));

	let memberships = backend
		.memberships(&session.principal.id)
		.await
		.expect("Membership query should succeed with the session token.");

	assert_eq!(
		memberships,
		vec![
			Membership {
				org_id: org_id("org-a"),
				user_id: session.principal.id.clone(),
				role: Role::Owner,
			},
			Membership {
				org_id: org_id("org-b"),
				user_id: session.principal.id.clone(),
				role: Role::Other("billing".into()),
			},
		]
	);

	token_mock.assert_async().await;
	members_mock.assert_async().await;
}

#[tokio::test]
async fn rejected_credentials_map_to_rejected_errors() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());

	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/v1/token");
			then.status(400).header("content-type", "application/json").json_body(json!({
				"error": "invalid_grant",
				"error_description": "Invalid login credentials"
			}));
		})
		.await;

	let err = backend
		.sign_in_with_password("u1@acme.io", &Secret::new("wrong"))
		.await
		.expect_err("Invalid credentials should be rejected.");

	match err {
		BackendError::Rejected { status, message, .. } => {
			assert_eq!(status, Some(400));
			assert!(message.contains("Invalid login credentials"), "{message}");
		},
		other => panic!("Unexpected error: {other:?}."),
	}
	assert!(backend.current_session().is_none());
}

#[tokio::test]
async fn organization_lookup_skips_empty_sets_and_filters_by_id() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());
	let orgs_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/rest/v1/organizations")
				.query_param("select", "id,name")
				.query_param("id", "in.(\"org-a\",\"org-b\")")
				.header("authorization", ANON_BEARER);
			then.status(200).header("content-type", "application/json").json_body(json!([
				{ "id": "org-a", "name": "Alpha" },
				{ "id": "org-b", "name": "Beta" }
			]));
		})
		.await;

	assert!(backend.organizations(&[]).await.expect("Empty lookups need no request.").is_empty());

	let rows = backend
		.organizations(&[org_id("org-a"), org_id("org-b")])
		.await
		.expect("Organization lookup should succeed.");

	assert_eq!(
		rows,
		vec![
			OrganizationRow { id: org_id("org-a"), name: "Alpha".into() },
			OrganizationRow { id: org_id("org-b"), name: "Beta".into() },
		]
	);

	orgs_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn missing_procedure_is_reported_as_procedure_missing() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());

	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/rest/v1/rpc/create_org_with_owner")
				.json_body(json!({ "p_name": "Acme" }));
			then.status(404).header("content-type", "application/json").json_body(json!({
				"code": "PGRST202",
				"message": "Could not find the function public.create_org_with_owner(p_name)"
			}));
		})
		.await;

	assert!(matches!(
		backend.create_org_with_owner("Acme").await,
		Err(BackendError::ProcedureMissing { .. })
	));
}

#[tokio::test]
async fn procedure_result_accepts_scalar_and_list_payloads() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());

	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/rest/v1/rpc/create_org_with_owner")
				.json_body(json!({ "p_name": "Scalar" }));
			then.status(200).header("content-type", "application/json").json_body(json!("org-s"));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/rest/v1/rpc/create_org_with_owner")
				.json_body(json!({ "p_name": "List" }));
			then.status(200).header("content-type", "application/json").json_body(json!(["org-l"]));
		})
		.await;

	assert_eq!(
		backend.create_org_with_owner("Scalar").await.expect("Scalar result should decode."),
		org_id("org-s")
	);
	assert_eq!(
		backend.create_org_with_owner("List").await.expect("List result should decode."),
		org_id("org-l")
	);
}

#[tokio::test]
async fn resolver_falls_back_to_two_step_creation_over_rest() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());
	let owner = principal("u1", "u1@acme.io");

	backend.restore(Session::new(owner.clone(), "access-u1"));

	let rpc_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/rest/v1/rpc/create_org_with_owner");
			then.status(404).body("");
		})
		.await;
	let insert_org_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/rest/v1/organizations")
				.header("prefer", "return=representation")
				.header("authorization", "Bearer access-u1")
				.json_body(json!({ "name": "Acme", "created_by": "u1" }));
			then.status(201)
				.header("content-type", "application/json")
				.json_body(json!([{ "id": "org-new", "name": "Acme" }]));
		})
		.await;
	let insert_member_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/rest/v1/org_members")
				.header("prefer", "return=minimal")
				.json_body(json!({ "org_id": "org-new", "user_id": "u1", "role": "owner" }));
			then.status(201);
		})
		.await;
	let members_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/rest/v1/org_members");
			then.status(200).header("content-type", "application/json").json_body(json!([]));
		})
		.await;
	let resolver = OrganizationResolver::new(backend.clone())
		.with_fallback(CreationFallback::Compensating);

	resolver.on_principal_change(Some(owner.clone())).await;

	let created = resolver
		.create_organization("Acme", &owner)
		.await
		.expect("Fallback creation should succeed.");
	let snapshot = resolver.snapshot();

	assert_eq!(created, org_id("org-new"));
	assert_eq!(snapshot.current, Some(created));
	assert_eq!(snapshot.current_role, Some(Role::Owner));

	rpc_mock.assert_async().await;
	insert_org_mock.assert_async().await;
	insert_member_mock.assert_async().await;
	members_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn enabled_modules_follow_the_module_join() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());

	server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/rest/v1/org_modules")
				.query_param("select", "enabled,modules:module_id(code,name)")
				.query_param("org_id", "eq.org-a")
				.query_param("enabled", "eq.true");
			then.status(200).header("content-type", "application/json").json_body(json!([
				{ "enabled": true, "modules": { "code": "operations", "name": "Operations" } },
				{ "enabled": true, "modules": null },
				{ "enabled": true, "modules": { "code": "acct", "name": "Accounting" } }
			]));
		})
		.await;

	let entries = modules::enabled_modules(backend.as_ref(), &org_id("org-a")).await;

	assert_eq!(
		entries.into_iter().map(|entry| entry.kind).collect::<Vec<_>>(),
		vec![ModuleKind::Operations, ModuleKind::Accounting]
	);
}

#[tokio::test]
async fn uploads_send_storage_headers() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());
	let upload_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/storage/v1/object/csv-uploads/org-a/u1/2025-01-01T00-00-00-000Z_a.csv")
				.header("content-type", "text/csv")
				.header("cache-control", "max-age=3600")
				.header("x-upsert", "false")
				.body("x,y\n1,2\n");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "Key": "csv-uploads/org-a/u1/2025-01-01T00-00-00-000Z_a.csv" }));
		})
		.await;
	let options = UploadOptions {
		cache_control_secs: 3600,
		upsert: false,
		content_type: "text/csv".into(),
	};
	let path = "org-a/u1/2025-01-01T00-00-00-000Z_a.csv";

	backend
		.upload("csv-uploads", path, b"x,y\n1,2\n".to_vec(), &options)
		.await
		.expect("Upload should succeed.");

	let url = backend.public_url("csv-uploads", path).expect("Public URL should build.");

	assert_eq!(
		url.as_str(),
		format!("{}/storage/v1/object/public/csv-uploads/{path}", server.base_url())
	);

	upload_mock.assert_async().await;
}

#[tokio::test]
async fn expired_session_is_refreshed_on_restore() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());
	let owner = principal("u1", "u1@acme.io");
	let expired = Session::new(owner.clone(), "stale-access")
		.with_refresh_token("refresh-u1")
		.with_expires_at(OffsetDateTime::now_utc() - Duration::minutes(5));

	backend.restore(expired);

	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/v1/token")
				.query_param("grant_type", "refresh_token")
				.json_body(json!({ "refresh_token": "refresh-u1" }));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(token_body("u1", "fresh-access"));
		})
		.await;
	let session = backend
		.get_session()
		.await
		.expect("Refresh should succeed.")
		.expect("A refreshed session should be returned.");

	assert_eq!(session.access_token, Secret::new("fresh-access"));
	assert_eq!(session.principal, owner);
	assert!(!session.is_expired_at(OffsetDateTime::now_utc()));

	refresh_mock.assert_async().await;
}

#[tokio::test]
async fn failed_refresh_clears_the_session() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());
	let expired = Session::new(principal("u1", "u1@acme.io"), "stale-access")
		.with_refresh_token("revoked")
		.with_expires_at(OffsetDateTime::now_utc() - Duration::minutes(5));

	backend.restore(expired);
	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/v1/token");
			then.status(400).header("content-type", "application/json").json_body(json!({
				"error_code": "refresh_token_not_found",
				"msg": "Invalid Refresh Token"
			}));
		})
		.await;

	assert!(matches!(backend.get_session().await, Err(BackendError::Rejected { .. })));
	assert!(backend.current_session().is_none());
}

#[tokio::test]
async fn sign_out_revokes_and_forgets_the_session() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());

	backend.restore(Session::new(principal("u1", "u1@acme.io"), "access-u1"));

	let logout_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/v1/logout").header("authorization", "Bearer access-u1");
			then.status(204);
		})
		.await;

	backend.sign_out().await.expect("Logout should succeed.");

	assert!(backend.current_session().is_none());

	backend.sign_out().await.expect("Signing out without a session is a no-op.");

	logout_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn table_calls_refresh_an_expired_session_once() {
	let server = MockServer::start_async().await;
	let backend = build_rest_test_backend(&server.base_url());
	let owner = principal("u1", "u1@acme.io");
	let expired = Session::new(owner.clone(), "stale-access")
		.with_refresh_token("refresh-u1")
		.with_expires_at(OffsetDateTime::now_utc() - Duration::minutes(5));

	backend.restore(expired);

	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/v1/token")
				.query_param("grant_type", "refresh_token")
				.json_body(json!({ "refresh_token": "refresh-u1" }));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(token_body("u1", "fresh-access"));
		})
		.await;
	let members_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/rest/v1/org_members")
				.header("authorization", "Bearer fresh-access");
			then.status(200).header("content-type", "application/json").json_body(json!([]));
		})
		.await;

	for _ in 0..2 {
		let memberships = backend
			.memberships(&owner.id)
			.await
			.expect("Membership query should succeed with the refreshed token.");

		assert!(memberships.is_empty());
	}

	assert_eq!(
		backend.current_session().map(|session| session.access_token),
		Some(Secret::new("fresh-access"))
	);

	refresh_mock.assert_calls_async(1).await;
	members_mock.assert_calls_async(2).await;
}
