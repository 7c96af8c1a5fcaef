#![forbid(unsafe_code)]

use redkeep_core::{DesiredTopology, NodeRole, PlatformError, ReconcileError};
use redkeep_kubehub::{fake::FakePlatform, observe_cluster, observe_role};
use tokio_util::sync::CancellationToken;

fn topology() -> DesiredTopology {
    DesiredTopology::new("prod", "cache", 3, 1).expect("valid topology")
}

#[tokio::test]
async fn snapshots_are_split_by_role_and_namespace() {
    let fake = FakePlatform::new();
    fake.add_workload("prod", "l0", "cache", NodeRole::Leader);
    fake.add_workload("prod", "l1", "cache", NodeRole::Leader);
    fake.add_workload("prod", "f0", "cache", NodeRole::Follower);
    // Different namespace and different app must not leak in.
    fake.add_workload("staging", "l9", "cache", NodeRole::Leader);
    fake.add_workload("prod", "other", "sessions", NodeRole::Leader);

    let obs = observe_cluster(&fake, &topology(), &CancellationToken::new()).await.expect("observe ok");
    let leaders: Vec<_> = obs.leaders.items().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(leaders, vec!["l0", "l1"]);
    assert_eq!(obs.followers.len(), 1);
    assert!(obs.followers.items().iter().all(|r| r.role == NodeRole::Follower));
    assert_eq!(fake.list_calls(), 2);
}

#[tokio::test]
async fn list_failure_is_a_query_error_without_retry() {
    let fake = FakePlatform::new();
    fake.fail_list(PlatformError::Transport("connection reset".into()));
    let err = observe_role(&fake, &topology().selector(NodeRole::Leader), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::PlatformQuery { role: NodeRole::Leader, .. }), "got {err:?}");
    assert_eq!(fake.list_calls(), 1);
}

#[tokio::test]
async fn cancelled_observe_does_not_list() {
    let fake = FakePlatform::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = observe_cluster(&fake, &topology(), &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(fake.list_calls(), 0);
}
