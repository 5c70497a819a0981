// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios exercising `CommunitySystem` across several real TCP
//! connections, wiring `mesh-net`, `mesh-system`, and `mesh-pty` together the
//! way `mm join`/`tell`/`list` do.

use std::sync::Arc;
use std::time::Duration;

use mesh_net::{MeshError, PeerNode, PeerNodeConfig};
use mesh_pty::{LocalPty, Member, PtyProcess, PtySpawnOptions};
use mesh_system::{ActorHandle, CommunitySystem, SystemError};

async fn start_system(name: &str) -> Arc<CommunitySystem> {
    let node = PeerNode::new(PeerNodeConfig {
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
    });
    let system = CommunitySystem::new(name.to_string(), node);
    system.start().await.expect("system should bind on port 0");
    system
}

fn spawn_echo_member(system: &Arc<CommunitySystem>, name: &str) -> Arc<LocalPty> {
    let pty = LocalPty::spawn(PtySpawnOptions {
        command: "cat".to_string(),
        cwd: None,
        rows: 24,
        cols: 80,
        env: Vec::new(),
    })
    .expect("cat should spawn");
    let member = Member::new(name, pty.clone());
    let actor_id = system.ready(Arc::new(member));
    system.claim_name(name, &actor_id).expect("name should be free");
    pty
}

async fn expect_line(pty: &Arc<LocalPty>, needle: &str, within: Duration) {
    let mut output = pty.subscribe();
    let result = tokio::time::timeout(within, async {
        loop {
            let chunk = output.recv().await.expect("pty output channel closed");
            if String::from_utf8_lossy(&chunk).contains(needle) {
                return;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "never saw {needle:?} on the PTY within {within:?}");
}

/// S2: a `tell` placed from one system lands on a member hosted by another.
#[tokio::test]
async fn two_node_tell_reaches_the_remote_member() {
    let a = start_system("a").await;
    let alice_pty = spawn_echo_member(&a, "alice");

    let b = start_system("b").await;
    b.connect_to_peer(&a.local_peer_id())
        .await
        .expect("b should connect to a");

    let found = b
        .find_member(&a.local_peer_id(), "alice")
        .await
        .expect("find_member should succeed")
        .expect("alice should be found");

    let handle = ActorHandle::new(found.actor_id);
    b.remote_call_void(&handle, "Member.tell:1", &"hi".to_string())
        .await
        .expect("tell should succeed");

    expect_line(&alice_pty, "hi", Duration::from_millis(500)).await;

    let _ = alice_pty.close();
    a.stop().await;
    b.stop().await;
}

/// S3: a third system connected to two hosts sees both of their members.
#[tokio::test]
async fn list_across_peers_sees_every_connected_host() {
    let a = start_system("a").await;
    let alice_pty = spawn_echo_member(&a, "alice");

    let c = start_system("c").await;
    let carol_pty = spawn_echo_member(&c, "carol");

    let b = start_system("b").await;
    b.connect_to_peer(&a.local_peer_id()).await.unwrap();
    b.connect_to_peer(&c.local_peer_id()).await.unwrap();

    let members = b.all_members_with_status().await;
    assert!(members.iter().any(|m| m.name == "alice" && m.peer_id == a.local_peer_id().to_string()));
    assert!(members.iter().any(|m| m.name == "carol" && m.peer_id == c.local_peer_id().to_string()));

    let _ = alice_pty.close();
    let _ = carol_pty.close();
    a.stop().await;
    b.stop().await;
    c.stop().await;
}

/// S4: claiming an already-held name fails rather than silently replacing it.
#[tokio::test]
async fn duplicate_name_on_the_same_host_is_rejected() {
    let a = start_system("a").await;
    let first_pty = spawn_echo_member(&a, "alice");

    let second_pty = LocalPty::spawn(PtySpawnOptions {
        command: "cat".to_string(),
        cwd: None,
        rows: 24,
        cols: 80,
        env: Vec::new(),
    })
    .unwrap();
    let second_id = a.ready(Arc::new(Member::new("alice", second_pty.clone())));

    let err = a.claim_name("alice", &second_id).unwrap_err();
    assert!(matches!(err, SystemError::NameAlreadyTaken(ref n) if n == "alice"));

    let _ = first_pty.close();
    let _ = second_pty.close();
    a.stop().await;
}

/// S5: once a peer goes away, it stops showing up in member listings.
#[tokio::test]
async fn dead_peer_disappears_from_member_listings() {
    let a = start_system("a").await;
    let alice_pty = spawn_echo_member(&a, "alice");

    let b = start_system("b").await;
    b.connect_to_peer(&a.local_peer_id()).await.unwrap();
    assert!(b
        .find_member(&a.local_peer_id(), "alice")
        .await
        .unwrap()
        .is_some());

    a.stop().await;
    let _ = alice_pty.close();

    // Give b's connection loop a moment to notice the closed socket and run
    // its on_connection_closed cleanup.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let members = b.all_members_with_status().await;
    assert!(!members.iter().any(|m| m.name == "alice"));

    b.stop().await;
}

/// S6: the lower-level contract a port-busy rebind depends on — binding a
/// taken port fails, and a fresh system on an OS-assigned port can still
/// reach the one already listening.
#[tokio::test]
async fn a_second_system_can_reach_one_already_bound_after_its_own_port_is_taken() {
    let a = start_system("a").await;
    let alice_pty = spawn_echo_member(&a, "alice");
    let busy_port = a.local_peer_id().port;

    let colliding_node = PeerNode::new(PeerNodeConfig {
        name: "b-attempt".to_string(),
        host: "127.0.0.1".to_string(),
        port: busy_port,
    });
    let collision = CommunitySystem::new("b-attempt".to_string(), colliding_node);
    let err = collision.start().await.unwrap_err();
    assert!(matches!(err, SystemError::Mesh(MeshError::PortUnavailable(p)) if p == busy_port));

    let b = start_system("b").await;
    b.connect_to_peer(&a.local_peer_id()).await.unwrap();
    let found = b.find_member(&a.local_peer_id(), "alice").await.unwrap();
    assert!(found.is_some());

    let _ = alice_pty.close();
    a.stop().await;
    b.stop().await;
}
