// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn register_and_unregister_tracks_count() {
    let registry = ClientRegistry::default();
    let (id, _rx) = registry.register();
    assert_eq!(registry.count(), 1);
    registry.unregister(id);
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn broadcast_delivers_to_every_client() {
    let registry = ClientRegistry::default();
    let (_id1, mut rx1) = registry.register();
    let (_id2, mut rx2) = registry.register();

    registry.broadcast(serde_json::json!({"type": "event"}));

    assert_eq!(rx1.recv().await.unwrap()["type"], "event");
    assert_eq!(rx2.recv().await.unwrap()["type"], "event");
}

#[tokio::test]
async fn full_queue_drops_the_slow_client_not_the_producer() {
    let registry = ClientRegistry::default();
    let (slow_id, rx) = registry.register();
    // Leave rx unread so its queue fills up.

    for _ in 0..CLIENT_CHANNEL_CAPACITY + 1 {
        registry.broadcast(serde_json::json!({"type": "event"}));
    }

    assert_eq!(registry.count(), 0, "slow client should have been dropped");
    drop(rx);
    let _ = slow_id;
}
