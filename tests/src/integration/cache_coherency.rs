//! # Cache Coherency
//!
//! Pull reads through the REST stub: TTL hits, shared in-flight fetches,
//! rejections, and invalidation by pushes and scrape commands.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use pulse_sync::FetchError;
    use pulse_types::{ResourceKey, ScrapeCommand};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_push_invalidates_cached_detail() {
        let api = ApiStub::start().await;
        let mut push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        client.start().unwrap();
        let server = push.next_client().await;
        wait_until(|| client.connection_status().is_connected()).await;

        let key = ResourceKey::restaurant("Mela");
        client.load(key.clone()).await.unwrap();
        client.load(key.clone()).await.unwrap();
        assert_eq!(api.hits("/api/restaurants/Mela"), 1);
        assert_eq!(client.cache_stats().hits, 1);

        api.set_restaurant(restaurant_row("Mela", 45));
        server.send_json(restaurant_update("Mela", 45));
        wait_until(|| {
            client
                .snapshot()
                .restaurant("Mela")
                .and_then(|record| record.get("menu_items_count").cloned())
                == Some(json!(45))
        })
        .await;

        let value = client.load(key).await.unwrap();
        assert_eq!(api.hits("/api/restaurants/Mela"), 2);
        assert_eq!(value["menu_items_count"], json!(45));
        assert_eq!(
            client.snapshot().restaurant_summary("Mela").unwrap().menu_items_count,
            45
        );

        client.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_request() {
        let api = ApiStub::start().await;
        let push = PushServer::start().await;
        let client = client(client_config(&api, &push));
        api.set_delay(Duration::from_millis(200));

        let key = ResourceKey::restaurant("Tandoor Palace");
        let (first, second) = tokio::join!(client.load(key.clone()), client.load(key.clone()));

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(api.hits("/api/restaurants/Tandoor Palace"), 1);
        let stats = client.cache_stats();
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.joins, 1);
        assert!(client.tracked_resources().contains(&key));
    }

    #[tokio::test]
    async fn test_unknown_restaurant_is_rejected_and_not_cached() {
        let api = ApiStub::start().await;
        let push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        let key = ResourceKey::restaurant("Nowhere");
        let err = client.load(key.clone()).await.unwrap_err();
        assert_eq!(err, FetchError::Rejected("Restaurant not found".to_string()));
        assert!(client.snapshot().restaurant("Nowhere").is_none());

        client.load(key).await.unwrap_err();
        assert_eq!(api.hits("/api/restaurants/Nowhere"), 2);
        assert_eq!(client.cache_stats().failures, 2);
    }

    #[tokio::test]
    async fn test_scrape_command_revalidates_status() {
        let api = ApiStub::start().await;
        let push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        client.load(ResourceKey::Status).await.unwrap();
        client.load(ResourceKey::Status).await.unwrap();
        assert_eq!(api.hits("/api/status"), 1);
        assert!(!client.snapshot().status().unwrap().is_running);

        let ack = client.execute(ScrapeCommand::Trigger).await.unwrap();
        assert_eq!(ack.message, "Scraping cycle triggered");
        assert_eq!(api.hits("/api/scrape/trigger"), 1);

        client.load(ResourceKey::Status).await.unwrap();
        assert_eq!(api.hits("/api/status"), 2);
        assert!(client.snapshot().status().unwrap().is_running);
    }

    #[tokio::test]
    async fn test_refresh_loads_tracked_resources() {
        let api = ApiStub::start().await;
        let push = PushServer::start().await;
        let client = client(client_config(&api, &push));

        client.load(ResourceKey::Analytics).await.unwrap();
        let report = client.refresh().await;

        assert!(report.is_complete());
        assert_eq!(report.loaded.len(), 3);
        assert_eq!(api.hits("/api/analytics/summary"), 2);
        assert_eq!(api.hits("/api/restaurants"), 1);

        let snapshot = client.snapshot();
        assert_eq!(snapshot.restaurants.len(), 2);
        assert_eq!(
            snapshot.resource(&ResourceKey::Analytics).unwrap()["total_restaurants"],
            json!(2)
        );
    }
}
