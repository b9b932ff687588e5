mod common;

use common::{repository, SharedBuffer, StubProvider};
use repo_vacuum::sink::{ManifestSink, NullSink};
use repo_vacuum::{Targets, Vacuum};

fn orgs(names: &[&str]) -> Targets {
    Targets {
        organizations: names.iter().map(|s| s.to_string()).collect(),
        users: Vec::new(),
    }
}

#[tokio::test]
async fn test_failing_organization_does_not_stop_the_run() {
    let provider = StubProvider::default()
        .with_org("a", Ok(vec![repository("a", "one"), repository("a", "two")]))
        .with_org("b", Err(403));
    let requested = provider.requested.clone();

    let buffer = SharedBuffer::default();
    let mut vacuum = Vacuum::new(Box::new(provider), Box::new(ManifestSink::new(buffer.clone())));

    let report = vacuum.run(&orgs(&["a", "b"])).await;

    assert_eq!(*requested.lock().unwrap(), vec!["a", "b"]);
    assert_eq!(report.targets, 2);
    assert_eq!(report.repositories, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors.to_string().contains("organization b"));

    // the manifest still describes everything from "a"
    let xml = buffer.contents();
    assert_eq!(xml.matches("<project ").count(), 2);
}

#[tokio::test]
async fn test_failed_run_still_flushes_once() {
    let provider = StubProvider::default().with_org("b", Err(404));

    let buffer = SharedBuffer::default();
    let mut vacuum = Vacuum::new(Box::new(provider), Box::new(ManifestSink::new(buffer.clone())));

    let report = vacuum.run(&Targets::default()).await;

    assert!(!report.is_success());
    let xml = buffer.contents();
    assert_eq!(xml.matches("<manifest>").count(), 1);
    assert_eq!(xml.matches("<project ").count(), 0);
}

#[tokio::test]
async fn test_manifest_end_to_end() {
    let provider = StubProvider::default().with_org("acme", Ok(vec![repository("acme", "foo")]));

    let buffer = SharedBuffer::default();
    let mut vacuum = Vacuum::new(Box::new(provider), Box::new(ManifestSink::new(buffer.clone())));

    let report = vacuum.run(&orgs(&["acme"])).await;
    assert!(report.is_success());

    let xml = buffer.contents();
    assert_eq!(xml.matches("<remote ").count(), 1);
    assert!(xml.contains(r#"<remote name="github-acme" fetch="https://x/acme"/>"#));
    assert!(xml.contains(r#"name="foo""#));
    assert!(xml.contains(r#"revision="main""#));
}

#[tokio::test]
async fn test_users_and_orgs_both_processed() {
    let provider = StubProvider::default()
        .with_org("acme", Ok(vec![repository("acme", "foo")]))
        .with_org("octocat", Ok(vec![repository("octocat", "dotfiles")]));
    let requested = provider.requested.clone();

    let mut vacuum = Vacuum::new(Box::new(provider), Box::new(NullSink));
    let targets = Targets {
        organizations: vec!["acme".to_string()],
        users: vec!["octocat".to_string()],
    };

    let report = vacuum.run(&targets).await;

    assert!(report.is_success());
    assert_eq!(report.repositories, 2);
    assert_eq!(*requested.lock().unwrap(), vec!["acme", "octocat"]);
}
