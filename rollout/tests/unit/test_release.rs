//! Release manager against a local server directory

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use rollout::config::ServerSpec;
use rollout::errors::RolloutError;
use rollout::release::{ReleaseManager, ReleaseState, Retention, Tag};
use rollout::session::{LocalProvider, RemoteSession, SessionProvider};
use rollout::storage::RemoteLayout;

use crate::support::{archive, APP};

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, minute, 0).unwrap()
}

struct Server {
    _root: TempDir,
    scratch: TempDir,
    session: Box<dyn RemoteSession>,
    home: std::path::PathBuf,
    layout: RemoteLayout,
}

impl Server {
    async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let provider = LocalProvider::new(root.path());
        let spec = ServerSpec::new("app", "10.0.0.1", 22);
        let home = provider.home_of(&spec);
        let session = provider.connect(&spec).await.unwrap();
        Self {
            _root: root,
            scratch: TempDir::new().unwrap(),
            session,
            home,
            layout: RemoteLayout::new(APP),
        }
    }

    async fn manager(&self, retention: Retention) -> ReleaseManager<'_> {
        ReleaseManager::open(self.session.as_ref(), &self.layout, retention)
            .await
            .unwrap()
    }

    /// stage, activate and prune, the way a deploy does
    async fn deploy(&self, retention: Retention, now: DateTime<Utc>) -> Tag {
        let mut manager = self.manager(retention).await;
        let tag = manager.stage(&archive(self.scratch.path()), now).await.unwrap();
        manager.activate(&tag).await.unwrap();
        manager.prune().await.unwrap();
        tag
    }

    fn current(&self) -> Option<String> {
        std::fs::read_to_string(self.home.join("rollout").join(APP).join("current"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    fn release_dir(&self, tag: &str) -> std::path::PathBuf {
        self.home.join("rollout").join(APP).join("releases").join(tag)
    }
}

#[tokio::test]
async fn test_deploy_leaves_one_active_release() {
    let server = Server::new().await;
    let first = server.deploy(Retention::Keep(3), at(0)).await;
    let second = server.deploy(Retention::Keep(3), at(1)).await;

    let manager = server.manager(Retention::Keep(3)).await;
    let history = manager.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.records().iter().filter(|r| r.active).count(), 1);
    assert_eq!(manager.active().unwrap().tag, second);
    assert_eq!(manager.state(), &ReleaseState::Active);
    assert_eq!(server.current().as_deref(), Some(second.as_str()));

    // the extracted binary is executable in place
    assert!(server.release_dir(second.as_str()).join(APP).is_file());
    assert!(server.release_dir(first.as_str()).is_dir());
}

#[tokio::test]
async fn test_listing_is_newest_first() {
    let server = Server::new().await;
    for minute in 0..3 {
        server.deploy(Retention::Keep(5), at(minute)).await;
    }

    let list = server.manager(Retention::Keep(5)).await.list();
    let tags: Vec<&str> = list.iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(tags, vec!["20260501-120200", "20260501-120100", "20260501-120000"]);
    assert!(list[0].active);
}

#[tokio::test]
async fn test_retention_bounds_history() {
    let server = Server::new().await;
    for minute in 0..5 {
        server.deploy(Retention::Keep(2), at(minute)).await;
        let manager = server.manager(Retention::Keep(2)).await;
        assert!(manager.history().len() <= 2);
    }

    let manager = server.manager(Retention::Keep(2)).await;
    let tags: Vec<&str> = manager.history().records().iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(tags, vec!["20260501-120300", "20260501-120400"]);
    assert!(!server.release_dir("20260501-120000").exists());
}

#[tokio::test]
async fn test_rollback_disabled_keeps_only_active() {
    let server = Server::new().await;
    for minute in 0..3 {
        let tag = server.deploy(Retention::ActiveOnly, at(minute)).await;
        let manager = server.manager(Retention::ActiveOnly).await;
        assert_eq!(manager.history().len(), 1);
        assert_eq!(manager.active().unwrap().tag, tag);
    }
}

#[tokio::test]
async fn test_rollback_to_missing_tag() {
    let server = Server::new().await;
    server.deploy(Retention::Keep(3), at(0)).await;
    let active = server.deploy(Retention::Keep(3), at(1)).await;

    let mut manager = server.manager(Retention::Keep(3)).await;
    for missing in ["20200101-000000", "not-a-tag"] {
        let err = assert_err!(manager.rollback(missing).await);
        assert!(matches!(err, RolloutError::RollbackNotFound(_)));
    }
    assert_eq!(manager.active().unwrap().tag, active);
    assert_eq!(server.current().as_deref(), Some(active.as_str()));
}

#[tokio::test]
async fn test_rollback_to_pruned_tag() {
    let server = Server::new().await;
    let oldest = server.deploy(Retention::Keep(2), at(0)).await;
    server.deploy(Retention::Keep(2), at(1)).await;
    let active = server.deploy(Retention::Keep(2), at(2)).await;

    let mut manager = server.manager(Retention::Keep(2)).await;
    let err = assert_err!(manager.rollback(oldest.as_str()).await);
    assert!(matches!(err, RolloutError::RollbackNotFound(_)));
    assert_eq!(server.current().as_deref(), Some(active.as_str()));
}

#[tokio::test]
async fn test_rollback_moves_pointer() {
    let server = Server::new().await;
    let first = server.deploy(Retention::Keep(3), at(0)).await;
    server.deploy(Retention::Keep(3), at(1)).await;

    let mut manager = server.manager(Retention::Keep(3)).await;
    let tag = assert_ok!(manager.rollback(first.as_str()).await);
    assert_eq!(tag, first);
    assert_eq!(manager.active().unwrap().tag, first);
    assert_eq!(server.current().as_deref(), Some(first.as_str()));

    // the active release is now the oldest; pruning must skip it
    let mut manager = server.manager(Retention::Keep(1)).await;
    let pruned = manager.prune().await.unwrap();
    assert_eq!(pruned.len(), 1);
    assert_ne!(pruned[0], first);
    assert_eq!(manager.active().unwrap().tag, first);
    assert!(server.release_dir(first.as_str()).is_dir());
}

#[tokio::test]
async fn test_failed_activation_keeps_previous_release() {
    let server = Server::new().await;
    let previous = server.deploy(Retention::Keep(3), at(0)).await;

    let mut manager = server.manager(Retention::Keep(3)).await;
    let staged = manager
        .stage(&archive(server.scratch.path()), at(1))
        .await
        .unwrap();
    std::fs::remove_dir_all(server.release_dir(staged.as_str())).unwrap();

    let err = assert_err!(manager.activate(&staged).await);
    assert!(matches!(err, RolloutError::ActivationError(_)));
    assert_eq!(manager.state(), &ReleaseState::Active);
    assert_eq!(manager.active().unwrap().tag, previous);
    assert_eq!(server.current().as_deref(), Some(previous.as_str()));
}

#[tokio::test]
async fn test_activate_unknown_tag() {
    let server = Server::new().await;
    let mut manager = server.manager(Retention::Keep(3)).await;
    let tag = Tag::from_time(at(0));

    let err = assert_err!(manager.activate(&tag).await);
    assert!(matches!(err, RolloutError::ActivationError(_)));
    assert_eq!(manager.state(), &ReleaseState::Idle);
    assert!(server.current().is_none());
}

#[tokio::test]
async fn test_tags_stay_monotonic() {
    let server = Server::new().await;
    let first = server.deploy(Retention::Keep(3), at(5)).await;
    // a clock that went backwards still yields a newer tag
    let second = server.deploy(Retention::Keep(3), at(1)).await;
    assert!(second > first);
    assert_eq!(second.as_str(), "20260501-120501");
}

#[tokio::test]
async fn test_partial_extractions_are_ignored_and_pruned() {
    let server = Server::new().await;
    server.deploy(Retention::Keep(3), at(0)).await;
    let partial = server.release_dir("20260501-120100.partial");
    std::fs::create_dir_all(&partial).unwrap();

    let mut manager = server.manager(Retention::Keep(3)).await;
    assert_eq!(manager.history().len(), 1);

    let tag = manager.stage(&archive(server.scratch.path()), at(2)).await.unwrap();
    manager.activate(&tag).await.unwrap();
    manager.prune().await.unwrap();
    assert!(!partial.exists());
}
