//! Database model and payload types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated API user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

/// A named label attachable to components. Unique by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// A monitored service shown on the status page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// 1 Operational, 2 Performance Issues, 3 Partial Outage, 4 Major Outage.
    pub status: i64,
    pub link: String,
    pub order: i64,
    pub group_id: Option<i64>,
    pub enabled: bool,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Fields accepted when creating a component. `user_id` comes from the
/// authenticated principal, never the request body.
#[derive(Debug, Clone)]
pub struct NewComponent {
    pub name: String,
    pub description: String,
    pub status: i64,
    pub link: String,
    pub order: i64,
    pub group_id: Option<i64>,
    pub enabled: bool,
    pub user_id: i64,
}

/// A discrete status event, optionally tied to a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub component_id: Option<i64>,
    pub name: String,
    /// 0 Scheduled, 1 Investigating, 2 Identified, 3 Watching, 4 Fixed.
    pub status: i64,
    pub message: String,
    pub visible: bool,
    pub user_id: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIncident {
    pub component_id: Option<i64>,
    pub name: String,
    pub status: i64,
    pub message: String,
    pub visible: bool,
    pub user_id: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// A named time-series definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub id: i64,
    pub name: String,
    pub suffix: String,
    pub description: String,
    pub default_value: f64,
    /// 0 sum, 1 average.
    pub calc_type: i64,
    pub display_chart: bool,
    pub places: i64,
    pub default_view: i64,
    pub threshold: i64,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMetric {
    pub name: String,
    pub suffix: String,
    pub description: String,
    pub default_value: f64,
    pub calc_type: i64,
    pub display_chart: bool,
    pub places: i64,
    pub default_view: i64,
    pub threshold: i64,
    pub order: i64,
}

/// One sample of a metric. The parent metric id is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub id: i64,
    pub metric_id: i64,
    pub value: f64,
    pub counter: i64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request payloads
// ============================================================================
//
// Every field is optional: create contexts enforce required fields through
// the validation policy, update contexts overlay supplied fields onto the
// existing row.

#[derive(Debug, Default, Deserialize)]
pub struct ComponentPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<i64>,
    pub link: Option<String>,
    pub order: Option<i64>,
    pub group_id: Option<i64>,
    pub enabled: Option<bool>,
    /// Comma-separated tag names, handled outside the component row itself.
    pub tags: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IncidentPayload {
    pub component_id: Option<i64>,
    pub name: Option<String>,
    pub status: Option<i64>,
    pub message: Option<String>,
    pub visible: Option<bool>,
    /// Accepted on the wire but never trusted; the server substitutes the
    /// authenticated user's id.
    pub user_id: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricPayload {
    pub name: Option<String>,
    pub suffix: Option<String>,
    pub description: Option<String>,
    pub default_value: Option<f64>,
    pub calc_type: Option<i64>,
    pub display_chart: Option<bool>,
    pub places: Option<i64>,
    pub default_view: Option<i64>,
    pub threshold: Option<i64>,
    pub order: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricPointPayload {
    pub value: Option<f64>,
    pub counter: Option<i64>,
    /// Unix seconds; defaults to now.
    pub timestamp: Option<i64>,
}
