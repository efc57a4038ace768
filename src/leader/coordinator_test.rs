use std::sync::Arc;
use std::time::Duration;

use super::*;

#[tokio::test(start_paused = true)]
async fn first_candidate_wins_and_losers_get_the_winner() {
    let coordinator = InMemoryLeaderCoordinator::new(Duration::from_secs(10));
    let token_a = LeadershipToken::generate();
    let token_b = LeadershipToken::generate();

    let a = coordinator
        .get_or_create_leader("1/plugin/p/x", 1, &token_a)
        .await
        .unwrap();
    let b = coordinator
        .get_or_create_leader("1/plugin/p/x", 2, &token_b)
        .await
        .unwrap();

    assert_eq!(a.node_id, 1);
    assert_eq!(a.token, token_a);
    assert_eq!(b, a);
}

#[tokio::test(start_paused = true)]
async fn racing_candidates_converge_on_one_winner() {
    let coordinator = Arc::new(InMemoryLeaderCoordinator::new(Duration::from_secs(10)));

    let mut joins = Vec::new();
    for node_id in 1..=8 {
        let coordinator = coordinator.clone();
        joins.push(tokio::spawn(async move {
            coordinator
                .get_or_create_leader("1/plugin/p/x", node_id, &LeadershipToken::generate())
                .await
                .unwrap()
        }));
    }

    let mut leases = Vec::new();
    for join in joins {
        leases.push(join.await.unwrap());
    }
    assert!(leases.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test(start_paused = true)]
async fn stale_token_is_not_leader() {
    let coordinator = InMemoryLeaderCoordinator::new(Duration::from_secs(10));
    let token = LeadershipToken::generate();
    coordinator.get_or_create_leader("k", 1, &token).await.unwrap();

    assert!(coordinator.check_leadership("k", 1, &token).await.unwrap());
    assert!(!coordinator
        .check_leadership("k", 1, &LeadershipToken::from("stale"))
        .await
        .unwrap());
    assert!(!coordinator.check_leadership("k", 2, &token).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn expired_lease_is_taken_over_with_a_new_token() {
    let coordinator = InMemoryLeaderCoordinator::new(Duration::from_secs(10));
    let old = LeadershipToken::generate();
    coordinator.get_or_create_leader("k", 1, &old).await.unwrap();

    tokio::time::advance(Duration::from_secs(11)).await;
    let new = LeadershipToken::generate();
    let lease = coordinator.get_or_create_leader("k", 2, &new).await.unwrap();

    assert_eq!(lease.node_id, 2);
    assert_eq!(lease.token, new);
    assert!(!coordinator.check_leadership("k", 1, &old).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn renewal_keeps_the_lease_alive() {
    let coordinator = InMemoryLeaderCoordinator::new(Duration::from_secs(10));
    let token = LeadershipToken::generate();
    coordinator.get_or_create_leader("k", 1, &token).await.unwrap();

    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(coordinator.check_leadership("k", 1, &token).await.unwrap());
    }
    assert_eq!(coordinator.leader_of("k").map(|l| l.node_id), Some(1));
}

#[tokio::test(start_paused = true)]
async fn release_requires_the_current_token() {
    let coordinator = InMemoryLeaderCoordinator::new(Duration::from_secs(10));
    let token = LeadershipToken::generate();
    coordinator.get_or_create_leader("k", 1, &token).await.unwrap();

    coordinator
        .release("k", 1, &LeadershipToken::from("stale"))
        .await
        .unwrap();
    assert!(coordinator.leader_of("k").is_some());

    coordinator.release("k", 1, &token).await.unwrap();
    assert!(coordinator.leader_of("k").is_none());
}
