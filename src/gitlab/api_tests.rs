#![expect(clippy::unwrap_used, reason = "tests panic on failure")]

use http::StatusCode;
use rstest::rstest;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::api::{CreateMergeRequest, GitLabApi, MergeRequestState, RestGitLabApi, UpdateMergeRequest};
use super::error::GitLabApiError;

fn merge_request_json(iid: u64, state: &str, source_branch: &str) -> serde_json::Value {
    serde_json::json!({
        "iid": iid,
        "state": state,
        "sha": "a".repeat(40),
        "source_branch": source_branch,
        "target_branch": "main",
        "title": "migrate",
        "description": "a change",
        "web_url": format!("https://gitlab.example.com/group/repo/-/merge_requests/{iid}"),
        "detailed_merge_status": "mergeable",
    })
}

fn api_for(server: &MockServer) -> RestGitLabApi {
    RestGitLabApi::new(server.uri(), "secret-token").unwrap()
}

#[rstest]
#[tokio::test]
async fn get_project_resolves_the_numeric_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/group%2Frepo"))
        .and(header("PRIVATE-TOKEN", "secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42,
            "path_with_namespace": "group/repo",
        })))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let project = api.get_project("group/repo").await.unwrap();
    assert_eq!(project.id, 42);
    assert_eq!(project.path_with_namespace, "group/repo");
}

#[rstest]
#[tokio::test]
async fn a_missing_project_is_reported_by_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/group%2Fgone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "message": "404 Project Not Found",
        })))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let err = api.get_project("group/gone").await.unwrap_err();
    match err {
        GitLabApiError::ProjectNotFound { path: missing } => assert_eq!(missing, "group/gone"),
        other => panic!("expected a project-not-found error, got {other}"),
    }
}

#[rstest]
#[tokio::test]
async fn merge_requests_are_listed_by_source_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/42/merge_requests"))
        .and(query_param("source_branch", "feature-x"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([merge_request_json(7, "opened", "feature-x")])),
        )
        .mount(&server)
        .await;

    let api = api_for(&server);
    let merge_requests = api.list_merge_requests(42, "feature-x").await.unwrap();
    let mr = merge_requests.first().unwrap();
    assert_eq!(mr.iid, 7);
    assert_eq!(mr.state, MergeRequestState::Opened);
    assert_eq!(mr.detailed_merge_status.as_deref(), Some("mergeable"));
}

#[rstest]
#[tokio::test]
async fn create_posts_the_merge_request_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/42/merge_requests"))
        .and(body_json(serde_json::json!({
            "source_branch": "feature-x",
            "target_branch": "main",
            "title": "migrate",
            "description": "a change",
            "assignee_ids": [31],
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(merge_request_json(8, "opened", "feature-x")),
        )
        .mount(&server)
        .await;

    let api = api_for(&server);
    let created = api
        .create_merge_request(
            42,
            &CreateMergeRequest {
                source_branch: "feature-x".to_owned(),
                target_branch: "main".to_owned(),
                title: "migrate".to_owned(),
                description: "a change".to_owned(),
                assignee_ids: vec![31],
            },
        )
        .await
        .unwrap();
    assert_eq!(created.iid, 8);
}

#[rstest]
#[tokio::test]
async fn update_sends_only_the_changed_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/projects/42/merge_requests/7"))
        .and(body_json(serde_json::json!({ "title": "new title" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(merge_request_json(7, "opened", "feature-x")),
        )
        .mount(&server)
        .await;

    let api = api_for(&server);
    let updated = api
        .update_merge_request(
            42,
            7,
            &UpdateMergeRequest {
                title: Some("new title".to_owned()),
                ..UpdateMergeRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.iid, 7);
}

#[rstest]
#[tokio::test]
async fn users_are_looked_up_by_username() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("username", "reviewer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": 31, "username": "reviewer" },
        ])))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let users = api.list_users("reviewer").await.unwrap();
    assert_eq!(users.first().unwrap().id, 31);
}

#[rstest]
#[tokio::test]
async fn api_failures_preserve_the_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/42/merge_requests"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "message": "403 Forbidden",
        })))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let err = api.list_merge_requests(42, "feature-x").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    assert!(err.to_string().contains("list merge requests"));
}
