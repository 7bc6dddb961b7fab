#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use cbl_auth::{
	_preludet::*,
	auth::{FlowStatus, LifecycleState},
	error::ErrorKind,
	store::MemoryStore,
};

fn code_pair_body() -> serde_json::Value {
	json!({
		"user_code": "ABCD",
		"device_code": "device-1",
		"verification_uri": "https://example.com/us/code",
		"expires_in": 600,
		"interval": 0
	})
}

fn grant_body(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
	json!({
		"access_token": access,
		"refresh_token": refresh,
		"token_type": "bearer",
		"expires_in": expires_in
	})
}

async fn wait_for_hits(mock: &httpmock::Mock<'_>, hits: usize) {
	for _ in 0..100 {
		if mock.hits_async().await >= hits {
			return;
		}

		tokio::time::sleep(Duration::from_millis(50)).await;
	}

	panic!("Mock never reached {hits} hits.");
}

#[tokio::test]
async fn unverified_refresh_rejection_maps_to_invalid_cbl_client_id() {
	let server = MockServer::start_async().await;
	let _code_pair_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/create/codepair");
			then.status(200).json_body(code_pair_body());
		})
		.await;
	let _exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/token").body_contains("grant_type=device_code");
			then.status(200).json_body(grant_body("access-1", "refresh-1", 3600));
		})
		.await;
	let _refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/token").body_contains("grant_type=refresh_token");
			then.status(400).json_body(json!({ "error": "invalid_request" }));
		})
		.await;
	let _profile_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/user/profile");
			then.status(200).json_body(json!({ "user_id": "user-1" }));
		})
		.await;
	let store = Arc::new(MemoryStore::default());
	let (authorizer, manager) = spawn_test_authorizer(&server.base_url(), store).await;

	assert!(authorizer.authorize_using_cbl(Arc::new(RecordingObserver::default())));

	let status = tokio::time::timeout(
		Duration::from_secs(5),
		manager.wait_for(|status| status.state == LifecycleState::UnrecoverableError),
	)
	.await
	.expect("Unrecoverable error should be reported.");

	// The refresh token never minted an access token, so `invalid_request` means the
	// client id is not enabled for this linking method.
	assert_eq!(status.error, ErrorKind::InvalidCblClientId);
	assert_eq!(manager.events(), vec![
		FlowStatus::ok(LifecycleState::Authorizing),
		FlowStatus { state: LifecycleState::UnrecoverableError, error: ErrorKind::InvalidCblClientId },
	]);
	assert!(authorizer.auth_token().is_empty());

	authorizer.shutdown().await;
}

#[tokio::test]
async fn auth_failure_report_triggers_an_immediate_refresh() {
	let server = MockServer::start_async().await;
	let _code_pair_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/create/codepair");
			then.status(200).json_body(code_pair_body());
		})
		.await;
	let _exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/token").body_contains("grant_type=device_code");
			then.status(200).json_body(grant_body("access-1", "refresh-1", 3600));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/token").body_contains("grant_type=refresh_token");
			then.status(200).json_body(grant_body("access-2", "refresh-1", 3600));
		})
		.await;
	let _profile_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/user/profile");
			then.status(200).json_body(json!({ "user_id": "user-1" }));
		})
		.await;
	let store = Arc::new(MemoryStore::default());
	let (authorizer, manager) = spawn_test_authorizer(&server.base_url(), store).await;

	assert!(authorizer.authorize_using_cbl(Arc::new(RecordingObserver::default())));

	tokio::time::timeout(
		Duration::from_secs(5),
		manager.wait_for(|status| status.state == LifecycleState::Refreshed),
	)
	.await
	.expect("Refreshed should be reported.");

	// The next scheduled refresh is roughly an hour out; only a failure report can
	// make another one happen now.
	assert_eq!(refresh_mock.hits_async().await, 1);

	// A report against a token this authorizer no longer holds is dropped.
	authorizer.on_auth_failure("some-other-token");
	tokio::time::sleep(Duration::from_millis(300)).await;

	assert_eq!(refresh_mock.hits_async().await, 1);

	let current = authorizer.auth_token();

	authorizer.on_auth_failure(current.expose());
	wait_for_hits(&refresh_mock, 2).await;

	assert_eq!(authorizer.state().state, LifecycleState::Refreshed);

	authorizer.shutdown().await;
}

#[tokio::test]
async fn expired_is_reported_when_refreshes_keep_failing() {
	let server = MockServer::start_async().await;
	let _code_pair_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/create/codepair");
			then.status(200).json_body(code_pair_body());
		})
		.await;
	let _exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/token").body_contains("grant_type=device_code");
			then.status(200).json_body(grant_body("access-1", "refresh-1", 3600));
		})
		.await;
	// The first refresh succeeds with a one-second lifetime; every later one fails.
	let success_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/token").body_contains("grant_type=refresh_token");
			then.status(200).json_body(grant_body("access-2", "refresh-1", 1));
		})
		.await;
	let _profile_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/user/profile");
			then.status(200).json_body(json!({ "user_id": "user-1" }));
		})
		.await;
	let store = Arc::new(MemoryStore::default());
	let (authorizer, manager) = spawn_test_authorizer(&server.base_url(), store).await;

	assert!(authorizer.authorize_using_cbl(Arc::new(RecordingObserver::default())));

	tokio::time::timeout(
		Duration::from_secs(5),
		manager.wait_for(|status| status.state == LifecycleState::Refreshed),
	)
	.await
	.expect("Refreshed should be reported.");

	success_mock.delete_async().await;

	let _failing_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/O2/token").body_contains("grant_type=refresh_token");
			then.status(500).json_body(json!({ "error": "servererror" }));
		})
		.await;
	let status = tokio::time::timeout(
		Duration::from_secs(10),
		manager.wait_for(|status| status.state == LifecycleState::Expired),
	)
	.await
	.expect("Expired should be reported once the token outlives its refresh.");

	// The expiry is not terminal; the engine keeps retrying with the refresh token.
	assert_eq!(status.error, ErrorKind::Success);
	assert!(authorizer.auth_token().is_empty());

	authorizer.shutdown().await;
}
