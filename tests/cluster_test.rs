use raftlet::replicator::{LocalNetwork, PeerDirectory};
use raftlet::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

fn quiet(config: &mut RaftConfig) {
    config.command_interval = None;
}

/// Samples every node until `duration` has elapsed, asserting that no term
/// ever has two different leaders.
async fn watch_election_safety(
    cluster: &LocalCluster,
    duration: Duration,
    leaders_by_term: &mut HashMap<Term, PeerId>,
) {
    let step = Duration::from_millis(20);
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        for status in cluster.leaders().await {
            let leader = *leaders_by_term
                .entry(status.current_term)
                .or_insert(status.node_id);
            assert_eq!(
                leader, status.node_id,
                "two leaders in term {}",
                status.current_term
            );
        }
        sleep(step).await;
        elapsed += step;
    }
}

#[tokio::test(start_paused = true)]
async fn test_three_node_cluster_elects_first_timed_out_node() {
    let cluster = LocalCluster::start(3, |id, config| {
        quiet(config);
        if id == 1 {
            config.election_timeout_min = Duration::from_millis(300);
            config.election_timeout_max = Duration::from_millis(300);
        } else {
            config.election_timeout_min = Duration::from_millis(450);
            config.election_timeout_max = Duration::from_millis(500);
        }
    })
    .await
    .unwrap();

    for status in cluster.statuses().await {
        assert_eq!(status.role, Role::Follower);
        assert_eq!(status.current_term, 0);
    }

    sleep(Duration::from_millis(350)).await;

    let leader = cluster.node(1).unwrap().status().await;
    assert_eq!(leader.role, Role::Leader);
    assert_eq!(leader.current_term, 1);
    assert_eq!(leader.voted_for, Some(1));

    for id in [2, 3] {
        let follower = cluster.node(id).unwrap().status().await;
        assert_eq!(follower.role, Role::Follower);
        assert_eq!(follower.current_term, 1);
        assert_eq!(follower.voted_for, Some(1));
        assert_eq!(follower.leader_id, Some(1));
    }

    sleep(Duration::from_secs(2)).await;

    let statuses = cluster.statuses().await;
    assert_eq!(cluster.leaders().await.len(), 1);
    assert!(statuses.iter().all(|s| s.current_term == 1));

    for id in [2, 3] {
        let reply = cluster
            .node(id)
            .unwrap()
            .handle_append_entries(AppendEntriesRequest {
                term: 1,
                leader_id: 1,
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![],
                leader_commit: 0,
            })
            .await;
        assert!(reply.success);
        assert_eq!(reply.term, 1);
    }

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_single_node_elects_itself() {
    let cluster = LocalCluster::start(1, |_, config| quiet(config)).await.unwrap();

    sleep(Duration::from_millis(600)).await;

    let status = cluster.node(1).unwrap().status().await;
    assert_eq!(status.role, Role::Leader);
    assert_eq!(status.current_term, 1);
    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_suppress_election() {
    let network = LocalNetwork::new();
    let directory = PeerDirectory::from_addresses(1, &["local-1", "local-2", "local-3"]);
    let config = RaftConfig {
        command_interval: None,
        rng_seed: Some(7),
        ..RaftConfig::default()
    };
    let (node, events) = RaftNode::new(directory, config, network.transport(1));
    let node = Arc::new(node);
    network.register(&node).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = node.clone();
    let handle = tokio::spawn(async move { driver.run(events, shutdown_rx).await });

    let heartbeat = AppendEntriesRequest {
        term: 1,
        leader_id: 2,
        prev_log_index: 0,
        prev_log_term: 0,
        entries: vec![],
        leader_commit: 0,
    };

    for _ in 0..30 {
        sleep(Duration::from_millis(100)).await;
        let reply = node.handle_append_entries(heartbeat.clone()).await;
        assert!(reply.success);
        let status = node.status().await;
        assert_eq!(status.role, Role::Follower);
        assert_eq!(status.current_term, 1);
    }

    sleep(Duration::from_millis(600)).await;
    let status = node.status().await;
    assert_eq!(status.role, Role::Candidate);
    assert!(status.current_term >= 2);

    let _ = shutdown_tx.send(true);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_leadership_requires_majority() {
    let cluster = LocalCluster::start(5, |_, config| quiet(config)).await.unwrap();
    for id in [3, 4, 5] {
        cluster.network().isolate(id).await;
    }

    sleep(Duration::from_secs(3)).await;

    assert!(cluster.leaders().await.is_empty());
    let statuses = cluster.statuses().await;
    assert!(statuses.iter().all(|s| s.vote_count <= 2));
    let max_term = statuses.iter().map(|s| s.current_term).max().unwrap();
    assert!(max_term > 1, "candidates should keep starting new terms");

    cluster.network().heal_all().await;
    sleep(Duration::from_secs(5)).await;

    let statuses = cluster.statuses().await;
    let max_term = statuses.iter().map(|s| s.current_term).max().unwrap();
    let leaders: Vec<_> = statuses
        .iter()
        .filter(|s| s.is_leader() && s.current_term == max_term)
        .collect();
    assert_eq!(leaders.len(), 1);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_deposed_leader_adopts_newer_term() {
    let cluster = LocalCluster::start(3, |_, config| quiet(config)).await.unwrap();
    sleep(Duration::from_secs(1)).await;

    let old = cluster.leaders().await;
    assert_eq!(old.len(), 1);
    let old_leader = old[0].clone();

    cluster.network().isolate(old_leader.node_id).await;
    sleep(Duration::from_secs(2)).await;

    let newer: Vec<_> = cluster
        .leaders()
        .await
        .into_iter()
        .filter(|s| s.node_id != old_leader.node_id)
        .collect();
    assert_eq!(newer.len(), 1);
    assert!(newer[0].current_term > old_leader.current_term);

    cluster.network().heal(old_leader.node_id).await;
    sleep(Duration::from_secs(1)).await;

    let deposed = cluster.node(old_leader.node_id).unwrap().status().await;
    assert_eq!(deposed.role, Role::Follower);
    assert!(deposed.current_term >= newer[0].current_term);
    assert_eq!(cluster.leaders().await.len(), 1);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_two_leaders_share_a_term_under_partitions() {
    let cluster = LocalCluster::start(5, |_, config| quiet(config)).await.unwrap();
    let mut leaders_by_term = HashMap::new();

    watch_election_safety(&cluster, Duration::from_secs(2), &mut leaders_by_term).await;

    if let Some(leader) = cluster.leaders().await.first() {
        cluster.network().isolate(leader.node_id).await;
    }
    watch_election_safety(&cluster, Duration::from_secs(2), &mut leaders_by_term).await;

    cluster.network().heal_all().await;
    cluster.network().isolate(1).await;
    cluster.network().isolate(2).await;
    watch_election_safety(&cluster, Duration::from_secs(2), &mut leaders_by_term).await;

    cluster.network().heal_all().await;
    watch_election_safety(&cluster, Duration::from_secs(2), &mut leaders_by_term).await;

    assert!(leaders_by_term.len() >= 2);
    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_generated_commands_replicate_to_followers() {
    let cluster = LocalCluster::start(3, |_, config| {
        config.command_interval = Some(Duration::from_millis(200));
    })
    .await
    .unwrap();

    sleep(Duration::from_secs(3)).await;

    let leaders = cluster.leaders().await;
    assert_eq!(leaders.len(), 1);
    let leader = cluster.node(leaders[0].node_id).unwrap();
    let leader_log = leader.log_entries().await;
    let leader_status = leader.status().await;
    assert!(leader_log.len() >= 5);
    assert!(leader_status.commit_index >= 1);
    assert!(leader_status.last_applied <= leader_status.commit_index);

    for node in cluster.nodes() {
        let log = node.log_entries().await;
        assert!(log.len() >= leader_status.commit_index as usize);
        for (i, entry) in log.iter().enumerate() {
            assert_eq!(entry.index, i as LogIndex + 1);
            assert_eq!(entry, &leader_log[i]);
        }
        let status = node.status().await;
        assert!(status.commit_index <= status.last_log_index);
        assert!(status.last_applied <= status.commit_index);
    }

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_strict_mode_repairs_divergent_follower() {
    let cluster = LocalCluster::start(3, |_, config| {
        config.consistency = ConsistencyMode::Strict;
        config.command_interval = Some(Duration::from_millis(200));
    })
    .await
    .unwrap();

    sleep(Duration::from_secs(2)).await;
    let old_leader = cluster.leaders().await[0].node_id;

    cluster.network().isolate(old_leader).await;
    sleep(Duration::from_secs(2)).await;
    cluster.network().heal(old_leader).await;
    sleep(Duration::from_secs(5)).await;

    let leaders = cluster.leaders().await;
    assert_eq!(leaders.len(), 1);
    let leader = cluster.node(leaders[0].node_id).unwrap();
    let leader_log = leader.log_entries().await;

    for node in cluster.nodes() {
        let status = node.status().await;
        let log = node.log_entries().await;
        let committed = status.commit_index as usize;
        assert!(committed > 0);
        assert_eq!(&log[..committed], &leader_log[..committed]);
    }

    cluster.shutdown().await;
}
