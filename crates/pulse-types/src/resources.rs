//! # Resource Keys
//!
//! Identity of every pull-based read. The same key addresses the REST path,
//! the cache entry, and the push invalidation target.

use std::fmt;
use std::str::FromStr;

/// Category of a resource, used to look up its cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    RestaurantList,
    RestaurantDetail,
    Analytics,
    Trends,
    Status,
    Health,
}

/// A pull endpoint, keyed by resource identity.
///
/// Display form: `restaurants`, `restaurants:<name>`, `analytics`, `trends`,
/// `status`, `health`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    /// `GET /api/restaurants`
    Restaurants,
    /// `GET /api/restaurants/{name}`
    Restaurant(String),
    /// `GET /api/analytics/summary`
    Analytics,
    /// `GET /api/analytics/trends`
    Trends,
    /// `GET /api/status`
    Status,
    /// `GET /health`
    Health,
}

impl ResourceKey {
    pub fn restaurant(name: impl Into<String>) -> Self {
        Self::Restaurant(name.into())
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Restaurants => ResourceKind::RestaurantList,
            Self::Restaurant(_) => ResourceKind::RestaurantDetail,
            Self::Analytics => ResourceKind::Analytics,
            Self::Trends => ResourceKind::Trends,
            Self::Status => ResourceKind::Status,
            Self::Health => ResourceKind::Health,
        }
    }

    /// URL path segments, unescaped. Callers must percent-encode them.
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            Self::Restaurants => vec!["api", "restaurants"],
            Self::Restaurant(name) => vec!["api", "restaurants", name.as_str()],
            Self::Analytics => vec!["api", "analytics", "summary"],
            Self::Trends => vec!["api", "analytics", "trends"],
            Self::Status => vec!["api", "status"],
            Self::Health => vec!["health"],
        }
    }

    /// Restaurant name for per-restaurant keys.
    pub fn restaurant_name(&self) -> Option<&str> {
        match self {
            Self::Restaurant(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restaurants => f.write_str("restaurants"),
            Self::Restaurant(name) => write!(f, "restaurants:{name}"),
            Self::Analytics => f.write_str("analytics"),
            Self::Trends => f.write_str("trends"),
            Self::Status => f.write_str("status"),
            Self::Health => f.write_str("health"),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restaurants" => Ok(Self::Restaurants),
            "analytics" => Ok(Self::Analytics),
            "trends" => Ok(Self::Trends),
            "status" => Ok(Self::Status),
            "health" => Ok(Self::Health),
            other => match other.strip_prefix("restaurants:") {
                Some(name) if !name.is_empty() => Ok(Self::Restaurant(name.to_string())),
                _ => Err(format!("unknown resource key: {other}")),
            },
        }
    }
}

/// Scraper control commands. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrapeCommand {
    /// `POST /api/scrape/start`
    Start,
    /// `POST /api/scrape/stop`
    Stop,
    /// `POST /api/scrape/trigger`
    Trigger,
}

impl ScrapeCommand {
    pub fn path_segments(&self) -> [&'static str; 3] {
        match self {
            Self::Start => ["api", "scrape", "start"],
            Self::Stop => ["api", "scrape", "stop"],
            Self::Trigger => ["api", "scrape", "trigger"],
        }
    }
}

impl fmt::Display for ScrapeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Trigger => f.write_str("trigger"),
        }
    }
}

impl FromStr for ScrapeCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "trigger" => Ok(Self::Trigger),
            other => Err(format!("unknown scrape command: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_cache_key_format() {
        assert_eq!(ResourceKey::restaurant("Mela").to_string(), "restaurants:Mela");
        assert_eq!(ResourceKey::Restaurants.to_string(), "restaurants");
        assert_eq!(ResourceKey::Health.to_string(), "health");
    }

    #[test]
    fn test_parse_round_trip_for_names_with_colons() {
        let key: ResourceKey = "restaurants:Punjab: Palace".parse().unwrap();
        assert_eq!(key, ResourceKey::restaurant("Punjab: Palace"));
        assert!("restaurants:".parse::<ResourceKey>().is_err());
        assert!("menus".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(
            ResourceKey::restaurant("Mela").path_segments(),
            vec!["api", "restaurants", "Mela"]
        );
        assert_eq!(ResourceKey::Trends.path_segments(), vec!["api", "analytics", "trends"]);
        assert_eq!(ScrapeCommand::Stop.path_segments(), ["api", "scrape", "stop"]);
    }
}
