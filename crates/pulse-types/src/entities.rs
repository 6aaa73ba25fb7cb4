//! # Entities
//!
//! DTOs returned by the scraping service's REST endpoints. Every field is
//! defaulted so partially scraped restaurants still deserialize.

use serde::{Deserialize, Serialize};

/// Row of `GET /api/restaurants`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestaurantSummary {
    pub name: String,
    pub url: String,
    pub updated_at: Option<String>,
    pub menu_items_count: u64,
    pub categories_count: u64,
    pub menu_last_scraped: Option<String>,
    pub review_sources_count: u64,
    pub reviews_last_scraped: Option<String>,
    pub google_rating: f64,
    pub yelp_rating: f64,
    pub total_reviews: u64,
}

/// One failed scrape as reported in the status payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeFailure {
    pub restaurant: String,
    pub error: String,
    pub timestamp: Option<String>,
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingStatus {
    pub is_running: bool,
    pub current_restaurant: Option<String>,
    /// Percentage of the current cycle, 0-100.
    pub progress: f64,
    pub last_scrape_time: Option<String>,
    pub successful_scrapes: u64,
    pub errors: Vec<ScrapeFailure>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: Option<String>,
    pub scraping_active: bool,
    pub restaurants_monitored: u64,
    pub active_websocket_connections: u64,
    pub restaurants_in_cache: u64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Acknowledgement returned by the scrape command endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandAck {
    pub message: String,
}
