//! # Push Pipeline
//!
//! Frames sent by a real WebSocket server travel through the connection
//! manager, the message router and the snapshot, and reach subscribers in
//! arrival order.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use parking_lot::Mutex;
    use pulse_sync::{EventFilter, SyncChange};
    use pulse_types::{FrameKind, UpdateType};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_frames_reach_snapshot_and_subscribers_in_order() {
        let api = ApiStub::start().await;
        let mut push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        let _changes = client.subscribe(move |change, snapshot| {
            sink.lock().push((change.clone(), snapshot.version));
        });

        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();
        let _updates = client.subscribe_messages(
            EventFilter::kinds(vec![FrameKind::RestaurantUpdate]),
            move |message| {
                let items = message.data_field("menu_items_count").cloned();
                sink.lock().push((message.sequence, items));
            },
        );

        client.start().unwrap();
        let server = push.next_client().await;
        wait_until(|| client.connection_status().is_connected()).await;

        server.send_json(connection_established());
        server.send_json(restaurant_update("Mela", 40));
        server.send_text("{not json");
        server.send_json(heartbeat());
        server.send_json(restaurant_update("Mela", 42));

        wait_until(|| updates.lock().len() == 2).await;

        // Sequence numbers count accepted frames only.
        assert_eq!(
            *updates.lock(),
            vec![(2, Some(json!(40))), (3, Some(json!(42)))]
        );

        let snapshot = client.snapshot();
        assert_eq!(snapshot.malformed_frames, 1);
        let mela = snapshot.restaurant("Mela").unwrap();
        assert_eq!(mela.get("menu_items_count"), Some(&json!(42)));
        assert_eq!(mela.get("last_update_type"), Some(&json!("menu")));

        let stats = client.router_stats();
        assert_eq!(stats.received, 5);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.heartbeats, 1);

        // Heartbeats and malformed frames never reach the log.
        let kinds: Vec<FrameKind> = client
            .recent_events()
            .iter()
            .map(|message| message.kind().clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                FrameKind::ConnectionEstablished,
                FrameKind::RestaurantUpdate,
                FrameKind::RestaurantUpdate,
            ]
        );

        let pushed: Vec<SyncChange> = changes
            .lock()
            .iter()
            .map(|(change, _)| change.clone())
            .filter(|change| !matches!(change, SyncChange::Connection(_)))
            .collect();
        assert_eq!(
            pushed,
            vec![
                SyncChange::Established {
                    message: Some("Connected to Restaurant Intelligence Dashboard".to_string()),
                },
                SyncChange::RestaurantPatched {
                    name: "Mela".to_string(),
                    update_type: Some(UpdateType::Menu),
                },
                SyncChange::RestaurantPatched {
                    name: "Mela".to_string(),
                    update_type: Some(UpdateType::Menu),
                },
            ]
        );

        // Versions strictly increase across every delivered change.
        let versions: Vec<u64> = changes.lock().iter().map(|(_, version)| *version).collect();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));

        client.shutdown();
    }

    #[tokio::test]
    async fn test_push_wins_over_earlier_pull() {
        let api = ApiStub::start().await;
        let mut push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        client.start().unwrap();
        let server = push.next_client().await;
        wait_until(|| client.connection_status().is_connected()).await;

        client.load(pulse_types::ResourceKey::Restaurants).await.unwrap();
        assert_eq!(
            client.snapshot().restaurant("Mela").unwrap().get("menu_items_count"),
            Some(&json!(38))
        );

        server.send_json(restaurant_update("Mela", 44));
        wait_until(|| client.router_stats().received == 1).await;
        wait_until(|| {
            client
                .snapshot()
                .restaurant("Mela")
                .and_then(|record| record.get("menu_items_count").cloned())
                == Some(json!(44))
        })
        .await;

        // The server still reports the old count; the refetch is issued after
        // the push and carries the server's view.
        let report = client.refresh().await;
        assert!(report.is_complete());
        assert_eq!(
            client.snapshot().restaurant("Mela").unwrap().get("menu_items_count"),
            Some(&json!(38))
        );
        assert_eq!(
            client.snapshot().restaurant_summary("Tandoor Palace").unwrap().menu_items_count,
            52
        );

        client.shutdown();
    }
}
