//! Plain-text rendering of changes and snapshots.

use pulse_sync::{ConnectionState, DashboardSnapshot, SyncChange};

/// One line describing an applied change.
pub fn change_line(change: &SyncChange, snapshot: &DashboardSnapshot) -> String {
    let body = match change {
        SyncChange::Connection(ConnectionState::Connecting)
            if snapshot.connection.reconnect_attempt > 0 =>
        {
            format!(
                "connection connecting (retry {})",
                snapshot.connection.reconnect_attempt
            )
        }
        SyncChange::Connection(state) => format!("connection {state}"),
        SyncChange::ConnectionFailed { attempts } => {
            format!("connection failed after {attempts} attempts; restart to retry")
        }
        SyncChange::Established { message } => {
            format!("server: {}", message.as_deref().unwrap_or("connected"))
        }
        SyncChange::RestaurantPatched { name, update_type } => {
            let section = update_type
                .as_ref()
                .map_or_else(|| "data".to_string(), |t| t.to_string());
            format!("{name}: {section} updated")
        }
        SyncChange::StatusPatched(_) => scraper_line(snapshot),
        SyncChange::ServerError { message } => format!("server error: {message}"),
        SyncChange::ResourceLoaded(key) => format!("loaded {key}"),
    };
    format!("[v{}] {body}", snapshot.version)
}

/// Multi-line summary of the snapshot.
pub fn status_report(snapshot: &DashboardSnapshot) -> String {
    let mut lines = Vec::new();

    let connection = &snapshot.connection;
    let mut header = format!("connection: {}", connection.state);
    if connection.epoch > 0 {
        header.push_str(&format!(" (epoch {})", connection.epoch));
    }
    if snapshot.is_degraded() {
        header.push_str(" [degraded]");
    }
    lines.push(header);
    lines.push(scraper_line(snapshot));

    lines.push(format!("restaurants ({}):", snapshot.restaurants.len()));
    for name in snapshot.restaurants.keys() {
        let Some(summary) = snapshot.restaurant_summary(name) else {
            lines.push(format!("  {name}"));
            continue;
        };
        lines.push(format!(
            "  {:<24} menu {:>4}  google {:.1}  yelp {:.1}  reviews {:>5}",
            summary.name,
            summary.menu_items_count,
            summary.google_rating,
            summary.yelp_rating,
            summary.total_reviews,
        ));
    }

    if let Some(health) = snapshot.health() {
        lines.push(format!(
            "health: {} ({} monitored, {} ws clients)",
            health.status, health.restaurants_monitored, health.active_websocket_connections
        ));
    }
    if let Some(error) = &snapshot.last_error {
        lines.push(format!("last error: {}", error.message));
    }
    if snapshot.malformed_frames > 0 {
        lines.push(format!("malformed frames: {}", snapshot.malformed_frames));
    }

    lines.join("\n")
}

fn scraper_line(snapshot: &DashboardSnapshot) -> String {
    match snapshot.status() {
        None => "scraper: unknown".to_string(),
        Some(status) if status.is_running => {
            let mut line = format!("scraper: running {:.0}%", status.progress);
            if let Some(current) = &status.current_restaurant {
                line.push_str(&format!(" ({current})"));
            }
            line
        }
        Some(status) => match &status.last_scrape_time {
            Some(last) => format!("scraper: idle, last cycle {last}"),
            None => "scraper: idle".to_string(),
        },
    }
}
