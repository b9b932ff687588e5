mod common;

use common::options_for;
use repo_vacuum::provider::GitHub;
use repo_vacuum::{Provider, ProviderError};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn repo_json(owner: &str, name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "owner": { "login": owner, "html_url": format!("https://github.com/{}", owner) },
        "clone_url": format!("https://github.com/{}/{}.git", owner, name),
        "ssh_url": format!("git@github.com:{}/{}.git", owner, name),
        "default_branch": "main"
    })
}

fn next_link(server: &MockServer, route: &str) -> String {
    format!("<{}{}>; rel=\"next\"", server.uri(), route)
}

#[tokio::test]
async fn test_organization_repositories_follow_link_header() {
    let server = MockServer::start().await;

    // later pages are mounted first so they win over the page-less first request
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo_json("acme", "e"), repo_json("acme", "f")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next_link(&server, "/orgs/acme/repos?type=all&per_page=2&page=3").as_str())
                .set_body_json(json!([repo_json("acme", "c"), repo_json("acme", "d")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .and(query_param("type", "all"))
        .and(query_param("per_page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next_link(&server, "/orgs/acme/repos?type=all&per_page=2&page=2").as_str())
                .set_body_json(json!([repo_json("acme", "a"), repo_json("acme", "b")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), None)).unwrap();
    let listing = provider.organization_repositories("acme").await;

    assert!(listing.errors.is_empty(), "unexpected errors: {}", listing.errors);
    let names: Vec<_> = listing.items.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d", "e", "f"]);
    assert_eq!(listing.items[0].provider, "github");
    assert_eq!(listing.items[0].owner_url, "https://github.com/acme");
}

#[tokio::test]
async fn test_organization_filter_stops_on_client_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "acme" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/later"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "later" })))
        .expect(0)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), None)).unwrap();
    let filter = vec!["acme".to_string(), "missing".to_string(), "later".to_string()];
    let listing = provider.organizations(&filter).await;

    assert_eq!(listing.items, vec!["acme"]);
    assert_eq!(listing.errors.len(), 1);

    let err = listing.errors.iter().next().unwrap();
    assert!(matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::Client { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_own_account_lists_private_repositories() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "Octocat" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("affiliation", "owner,collaborator"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo_json("octocat", "private-notes")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), Some("secret-token"))).unwrap();
    let listing = provider.user_repositories("octocat").await;

    assert!(listing.errors.is_empty(), "unexpected errors: {}", listing.errors);
    assert_eq!(listing.items.len(), 1);
    assert_eq!(listing.items[0].name, "private-notes");
}

#[tokio::test]
async fn test_other_user_uses_public_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/someone/repos"))
        .and(query_param("type", "owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            repo_json("someone", "tool"),
            { "name": "no-urls", "owner": { "login": "someone" } }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), None)).unwrap();
    let listing = provider.user_repositories("someone").await;

    // the item without clone URLs is skipped and reported
    assert_eq!(listing.items.len(), 1);
    assert_eq!(listing.errors.len(), 1);
    assert!(listing.errors.to_string().contains("no clone URL"));
}

#[tokio::test]
async fn test_plain_text_forbidden_is_a_client_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>Forbidden by proxy</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), None)).unwrap();
    let listing = provider.organization_repositories("acme").await;

    assert!(listing.items.is_empty());
    assert_eq!(listing.errors.len(), 1);
    let err = listing.errors.iter().next().unwrap();
    assert!(matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::Client { status: 403, .. })
    ));
    assert!(err.to_string().contains("Forbidden by proxy"));
}

#[tokio::test]
async fn test_plain_text_not_found_stops_organization_filter() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/later"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "later" })))
        .expect(0)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), None)).unwrap();
    let filter = vec!["missing".to_string(), "later".to_string()];
    let listing = provider.organizations(&filter).await;

    assert!(listing.items.is_empty());
    assert_eq!(listing.errors.len(), 1);
    assert!(listing.errors.iter().next().unwrap().downcast_ref::<ProviderError>().is_some_and(ProviderError::is_client_error));
}

#[tokio::test]
async fn test_server_errors_are_requested_once_per_attempt() {
    let server = MockServer::start().await;

    // only the page driver retries, so three attempts are three requests
    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({ "message": "Bad Gateway" })))
        .expect(3)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), None)).unwrap();
    let listing = provider.organization_repositories("acme").await;

    assert!(listing.items.is_empty());
    assert_eq!(listing.errors.len(), 4);
    assert!(matches!(
        listing.errors.iter().last().unwrap().downcast_ref::<ProviderError>(),
        Some(ProviderError::RetriesExhausted { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs/acme/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_string("this is not json"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), None)).unwrap();
    let listing = provider.organization_repositories("acme").await;

    assert_eq!(listing.errors.len(), 1);
    let err = listing.errors.iter().next().unwrap();
    assert!(matches!(err.downcast_ref::<ProviderError>(), Some(ProviderError::Decode { .. })));
    assert!(!err.to_string().contains('\n'));
}

#[tokio::test]
async fn test_transport_errors_are_single_line() {
    // nothing listens on the discard port
    let provider = GitHub::new(options_for("http://127.0.0.1:9", None)).unwrap();
    let listing = provider.organization_repositories("acme").await;

    assert_eq!(listing.errors.len(), 4);
    for err in listing.errors.iter() {
        let text = err.to_string();
        assert!(!text.contains('\n'), "multi-line error: {}", text);
        assert!(!text.contains("Found at"), "backtrace in error: {}", text);
    }
    assert!(matches!(
        listing.errors.iter().next().unwrap().downcast_ref::<ProviderError>(),
        Some(ProviderError::Transport { .. })
    ));
}

#[tokio::test]
async fn test_identity_failure_falls_back_to_public_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo_json("octocat", "tool")])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), Some("secret-token"))).unwrap();
    let listing = provider.user_repositories("octocat").await;

    assert_eq!(listing.items.len(), 1);
    assert_eq!(listing.errors.len(), 1);
    assert!(matches!(
        listing.errors.iter().next().unwrap().downcast_ref::<ProviderError>(),
        Some(ProviderError::Server { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_token_for_another_user_uses_public_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "hubot" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/repos"))
        .and(query_param("type", "owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo_json("octocat", "tool")])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GitHub::new(options_for(&server.uri(), Some("secret-token"))).unwrap();
    let listing = provider.user_repositories("octocat").await;

    assert!(listing.errors.is_empty(), "unexpected errors: {}", listing.errors);
    assert_eq!(listing.items.len(), 1);
}
