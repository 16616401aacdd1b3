//! Log replication integration tests.

mod test_harness;

use std::time::Duration;

use roomly::error::RoomlyError;
use test_harness::{assert_eventually, TestCluster};

#[tokio::test]
async fn test_commands_replicate_to_all_nodes() {
    let cluster = TestCluster::new(3, 50200).await;
    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");

    let leader = cluster.get_node(&leader_id).unwrap();
    for i in 1..=3u64 {
        let index = leader
            .raft
            .clone()
            .append_command(format!("cmd-{}", i))
            .await
            .expect("append failed");
        assert_eq!(index, i);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(
        cluster
            .wait_for_log_len_on_all(3, Duration::from_secs(3))
            .await,
        "entries did not reach every node"
    );
    assert!(cluster.verify_log_consistency().await);

    // the leader committed and applied everything, in order
    assert_eventually(
        || async { leader.commit_index().await == 3 },
        Duration::from_secs(3),
        "leader did not commit all entries",
    )
    .await;
    assert_eq!(
        leader.applied.lock().unwrap().clone(),
        vec!["cmd-1", "cmd-2", "cmd-3"]
    );

    // followers apply in the same order (their commit index trails by one
    // replication round, so only a prefix is guaranteed)
    for node in cluster.nodes.values() {
        let applied = node.applied.lock().unwrap().clone();
        assert!(applied.len() <= 3);
        for (i, cmd) in applied.iter().enumerate() {
            assert_eq!(cmd, &format!("cmd-{}", i + 1));
        }
    }
}

#[tokio::test]
async fn test_append_rejected_on_follower() {
    let cluster = TestCluster::new(3, 50220).await;
    cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");

    let follower = cluster.any_follower().await.expect("no follower");
    let err = follower
        .raft
        .clone()
        .append_command("cmd".to_string())
        .await
        .expect_err("follower accepted a command");
    assert!(matches!(err, RoomlyError::NotLeader(_)));
}

#[tokio::test]
async fn test_committed_entries_survive_leader_loss() {
    let mut cluster = TestCluster::new(3, 50240).await;
    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");

    let leader = cluster.get_node(&leader_id).unwrap();
    leader
        .raft
        .clone()
        .append_command("durable-1".to_string())
        .await
        .unwrap();
    leader
        .raft
        .clone()
        .append_command("durable-2".to_string())
        .await
        .unwrap();

    assert!(
        cluster
            .wait_for_log_len_on_all(2, Duration::from_secs(3))
            .await,
        "entries did not replicate before leader loss"
    );

    assert!(cluster.stop_node(&leader_id));
    let new_leader_id = cluster
        .wait_for_new_leader(&leader_id, Duration::from_secs(3))
        .await
        .expect("no new leader elected");

    // leader completeness: the new leader still carries both entries
    let new_leader = cluster.get_node(&new_leader_id).unwrap();
    let entries = new_leader.log_entries().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].command, "durable-1");
    assert_eq!(entries[1].command, "durable-2");
}

#[tokio::test]
async fn test_replication_tolerates_minority_outage() {
    let mut cluster = TestCluster::new(3, 50260).await;
    let leader_id = cluster
        .wait_for_leader(Duration::from_secs(3))
        .await
        .expect("no leader elected");

    let follower = {
        let node = cluster.any_follower().await.expect("no follower");
        node.config.node_id.clone()
    };
    assert!(cluster.stop_node(&follower));

    // a two-of-three majority still accepts and commits commands
    let leader = cluster.get_node(&leader_id).unwrap();
    leader
        .raft
        .clone()
        .append_command("survives".to_string())
        .await
        .unwrap();

    assert_eventually(
        || async { leader.commit_index().await == 1 },
        Duration::from_secs(3),
        "leader did not commit with one follower down",
    )
    .await;
}
