
use std::time::Duration;

use seqstore::proto::ErrCode;
use seqstore::{ClusterJoiner, JoinError, JoinRequest};
use test_harness::{closed_addr, test_join_config, Behavior, TestPeer};

fn join_request() -> JoinRequest {
    JoinRequest::new("10.0.0.5:7000", "node-5")
        .with_metadata("zone", "us-east-1a")
        .with_metadata("rack", "r12")
}

/// The first seed is the leader: nobody else is contacted.
#[tokio::test]
async fn test_join_leader_directly() {
    let leader = TestPeer::spawn(Behavior::Accept).await;
    let other = TestPeer::spawn(Behavior::Accept).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&leader.addr, &other.addr]));
    let joined = joiner.try_join(&join_request()).await.expect("join should succeed");

    assert_eq!(joined.leader, leader.addr);
    assert_eq!(joined.round, 1);
    assert_eq!(leader.join_count().await, 1);
    assert_eq!(other.join_count().await, 0);
}

/// A follower's hint leads to the leader before later seeds are tried.
#[tokio::test]
async fn test_join_follows_leader_hint() {
    let leader = TestPeer::spawn(Behavior::Accept).await;
    let follower = TestPeer::spawn(Behavior::NotLeader(Some(leader.addr.clone()))).await;
    let later = TestPeer::spawn(Behavior::Accept).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&follower.addr, &later.addr]));
    let joined = joiner.try_join(&join_request()).await.expect("join should succeed");

    assert_eq!(joined.seed, follower.addr);
    assert_eq!(joined.leader, leader.addr);
    assert_eq!(follower.join_count().await, 1);
    assert_eq!(later.join_count().await, 0);

    // The leader sees exactly what the follower saw
    let expected = join_request().to_proto();
    assert_eq!(follower.requests().await, vec![expected.clone()]);
    assert_eq!(leader.requests().await, vec![expected]);
}

/// A -> B -> C, where only C leads.
#[tokio::test]
async fn test_join_follows_redirect_chain() {
    let c = TestPeer::spawn(Behavior::Accept).await;
    let b = TestPeer::spawn(Behavior::NotLeader(Some(c.addr.clone()))).await;
    let a = TestPeer::spawn(Behavior::Accept).await;
    a.set_behavior(Behavior::NotLeader(Some(b.addr.clone()))).await;
    let d = TestPeer::spawn(Behavior::Accept).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&a.addr, &d.addr]));
    let joined = joiner.try_join(&join_request()).await.expect("join should succeed");

    assert_eq!(joined.leader, c.addr);
    assert_eq!(a.join_count().await, 1);
    assert_eq!(b.join_count().await, 1);
    assert_eq!(c.join_count().await, 1);
    assert_eq!(d.join_count().await, 0);
}

/// A follower that does not know the leader is skipped, not retried.
#[tokio::test]
async fn test_join_skips_follower_without_leader() {
    let follower = TestPeer::spawn(Behavior::NotLeader(None)).await;
    let leader = TestPeer::spawn(Behavior::Accept).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&follower.addr, &leader.addr]));
    let joined = joiner.try_join(&join_request()).await.expect("join should succeed");

    assert_eq!(joined.seed, leader.addr);
    assert_eq!(follower.join_count().await, 1);
    assert_eq!(leader.join_count().await, 1);
}

#[tokio::test]
async fn test_join_skips_unreachable_seed() {
    let dead = closed_addr().await;
    let leader = TestPeer::spawn(Behavior::Accept).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&dead, &leader.addr]));
    let joined = joiner.try_join(&join_request()).await.expect("join should succeed");
    assert_eq!(joined.leader, leader.addr);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let err = joiner
        .join_once(&dead, &join_request(), deadline)
        .await
        .unwrap_err();
    assert!(matches!(err, JoinError::Call(seqstore::CallError::Connect { .. })));
}

#[tokio::test]
async fn test_join_skips_malformed_error_status() {
    let broken = TestPeer::spawn(Behavior::Malformed).await;
    let leader = TestPeer::spawn(Behavior::Accept).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&broken.addr, &leader.addr]));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let err = joiner
        .join_once(&broken.addr, &join_request(), deadline)
        .await
        .unwrap_err();
    assert!(matches!(err, JoinError::Decode { .. }));

    let joined = joiner.try_join(&join_request()).await.expect("join should succeed");
    assert_eq!(joined.leader, leader.addr);
}

#[tokio::test]
async fn test_join_rejection_is_reported() {
    let member = TestPeer::spawn(Behavior::Reject(ErrCode::AlreadyMember)).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&member.addr]));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    match joiner.join_once(&member.addr, &join_request(), deadline).await {
        Err(JoinError::Rejected { addr, error }) => {
            assert_eq!(addr, member.addr);
            assert_eq!(error.kind(), Some(ErrCode::AlreadyMember));
            assert_eq!(error.message, "join refused");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

/// Every seed rejects: all rounds are used, then the join gives up.
#[tokio::test]
async fn test_join_exhausts_attempts() {
    let a = TestPeer::spawn(Behavior::Reject(ErrCode::Internal)).await;
    let b = TestPeer::spawn(Behavior::NotLeader(None)).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&a.addr, &b.addr]));
    let err = joiner
        .try_join(&join_request())
        .await
        .expect_err("join should fail");

    assert_eq!(err.attempts, 3);
    assert_eq!(err.addrs, vec![a.addr.clone(), b.addr.clone()]);
    assert!(matches!(err.last_error, Some(JoinError::LeaderNotFound { .. })));
    assert_eq!(a.join_count().await, 3);
    assert_eq!(b.join_count().await, 3);
}

/// A leader listening on 0.0.0.0 is reached through the hinting peer's host.
#[tokio::test]
async fn test_join_resolves_unspecified_leader_host() {
    let leader = TestPeer::spawn(Behavior::Accept).await;
    let hint = format!("0.0.0.0:{}", leader.port());
    let follower = TestPeer::spawn(Behavior::NotLeader(Some(hint))).await;

    let joiner = ClusterJoiner::new(test_join_config(&[&follower.addr]));
    let joined = joiner.try_join(&join_request()).await.expect("join should succeed");

    assert_eq!(joined.leader, leader.addr);
    assert_eq!(leader.join_count().await, 1);
}
