//! # Reconnection
//!
//! Connection lifecycle against a real WebSocket server: remote close,
//! unanswered heartbeats, an unreachable server and manual control.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use parking_lot::Mutex;
    use pulse_sync::{ConnectionError, ConnectionState, SyncChange, SyncError};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_remote_close_reconnects_with_new_epoch() {
        let api = ApiStub::start().await;
        let mut push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        client.start().unwrap();
        let first = push.next_client().await;
        wait_until(|| client.connection_status().is_connected()).await;
        assert_eq!(client.connection_status().epoch, 1);

        first.close();
        let second = push.next_client().await;
        wait_until(|| {
            let status = client.connection_status();
            status.is_connected() && status.epoch == 2
        })
        .await;
        assert_eq!(client.connection_status().reconnect_attempt, 0);

        // Frames on the new connection carry the new epoch.
        second.send_json(restaurant_update("Mela", 39));
        wait_until(|| client.recent_events().len() == 1).await;
        assert_eq!(client.recent_events()[0].epoch, 2);
        assert_eq!(push.accepted(), 2);

        client.shutdown();
    }

    #[tokio::test]
    async fn test_unanswered_heartbeat_forces_reconnect() {
        let api = ApiStub::start().await;
        let mut push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        client.start().unwrap();
        let first = push.next_client().await;
        wait_until(|| client.connection_status().is_connected()).await;

        first.freeze();
        let _second = push.next_client().await;
        wait_until(|| client.connection_status().epoch == 2).await;
        assert!(client.connection_status().is_connected());

        first.close();
        client.shutdown();
    }

    #[tokio::test]
    async fn test_unreachable_server_exhausts_once() {
        let api = ApiStub::start().await;
        let mut push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let _handle = client.subscribe(move |change, _| {
            if let SyncChange::ConnectionFailed { attempts } = change {
                sink.lock().push(*attempts);
            }
        });

        client.start().unwrap();
        let first = push.next_client().await;
        wait_until(|| client.connection_status().is_connected()).await;

        push.stop();
        first.close();

        wait_until(|| client.connection_status().state == ConnectionState::Failed).await;
        wait_until(|| client.snapshot().connection_failed).await;
        assert_eq!(*failures.lock(), vec![5]);
        assert!(client.snapshot().is_degraded());

        // Failed is terminal until an explicit reconnect.
        assert!(matches!(
            client.start(),
            Err(SyncError::Connection(ConnectionError::Exhausted { .. }))
        ));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(client.connection_status().state, ConnectionState::Failed);
        assert_eq!(*failures.lock(), vec![5]);

        client.shutdown();
    }

    #[tokio::test]
    async fn test_manual_disconnect_stays_down_until_reconnect() {
        let api = ApiStub::start().await;
        let mut push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        client.start().unwrap();
        let _first = push.next_client().await;
        wait_until(|| client.connection_status().is_connected()).await;

        client.disconnect();
        let status = client.connection_status();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.manually_closed);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(push.accepted(), 1);
        assert_eq!(
            client.connection_status().state,
            ConnectionState::Disconnected
        );

        client.reconnect();
        let _second = push.next_client().await;
        wait_until(|| client.connection_status().is_connected()).await;
        let status = client.connection_status();
        assert_eq!(status.epoch, 2);
        assert!(!status.manually_closed);

        client.shutdown();
        assert_eq!(
            client.connection_status().state,
            ConnectionState::Disconnected
        );
    }
}
