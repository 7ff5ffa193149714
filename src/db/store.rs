//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

use super::models::*;

/// Timestamp format used for all stored datetimes.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    // --- Users ---

    /// Count registered users.
    pub fn count_users(&self) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
    }

    /// Create a user and return it.
    pub fn create_user(&self, username: &str, api_key: &str) -> Result<User, DbError> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_time(Utc::now());
        conn.execute(
            "INSERT INTO users (username, api_key, created_at) VALUES (?1, ?2, ?3)",
            params![username, api_key, now],
        )?;
        let id = conn.last_insert_rowid();
        fetch_user(&conn, id)
    }

    /// Resolve a user by API key.
    pub fn get_user_by_api_key(&self, api_key: &str) -> Result<User, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, username, api_key, created_at FROM users WHERE api_key = ?1",
            params![api_key],
            row_to_user,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    // --- Components ---

    /// Get one page of components plus the total row count.
    pub fn paginate_components(&self, page: i64, per_page: i64) -> Result<(Vec<Component>, i64), DbError> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM components", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT id, name, description, status, link, sort_order, group_id, enabled, user_id, created_at, updated_at
             FROM components ORDER BY sort_order ASC, id ASC LIMIT ?1 OFFSET ?2",
        )?;
        let mut components = stmt
            .query_map(params![per_page, (page - 1) * per_page], row_to_component)?
            .collect::<SqlResult<Vec<_>>>()?;

        for component in &mut components {
            component.tags = load_component_tags(&conn, component.id)?;
        }
        Ok((components, total))
    }

    /// Get a component by ID.
    pub fn get_component(&self, id: i64) -> Result<Component, DbError> {
        let conn = self.conn.lock().unwrap();
        fetch_component(&conn, id)
    }

    /// Create a component, syncing tags in the same transaction when a tag
    /// string was supplied.
    pub fn create_component(&self, new: &NewComponent, tags: Option<&str>) -> Result<Component, DbError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let now = fmt_time(Utc::now());

        tx.execute(
            "INSERT INTO components (name, description, status, link, sort_order, group_id, enabled, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.name,
                new.description,
                new.status,
                new.link,
                new.order,
                new.group_id,
                new.enabled as i64,
                new.user_id,
                now,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        if let Some(tag_string) = tags {
            sync_component_tags(&tx, id, tag_string)?;
        }

        tx.commit()?;
        fetch_component(&conn, id)
    }

    /// Update a component row, re-syncing tags when a tag string was
    /// supplied. Tag sync is a full replacement of the association set.
    pub fn update_component(&self, component: &Component, tags: Option<&str>) -> Result<Component, DbError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let now = fmt_time(Utc::now());

        let changed = tx.execute(
            "UPDATE components
             SET name=?1, description=?2, status=?3, link=?4, sort_order=?5, group_id=?6, enabled=?7, updated_at=?8
             WHERE id=?9",
            params![
                component.name,
                component.description,
                component.status,
                component.link,
                component.order,
                component.group_id,
                component.enabled as i64,
                now,
                component.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }

        if let Some(tag_string) = tags {
            sync_component_tags(&tx, component.id, tag_string)?;
        }

        tx.commit()?;
        fetch_component(&conn, component.id)
    }

    /// Delete a component and its tag associations. The tags themselves are
    /// kept for reuse.
    pub fn delete_component(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM component_tag WHERE component_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM components WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        tx.commit()?;
        Ok(())
    }

    // --- Incidents ---

    /// Get one page of incidents plus the total row count.
    pub fn paginate_incidents(&self, page: i64, per_page: i64) -> Result<(Vec<Incident>, i64), DbError> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM incidents", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT id, component_id, name, status, message, visible, user_id, scheduled_at, created_at, updated_at
             FROM incidents ORDER BY id ASC LIMIT ?1 OFFSET ?2",
        )?;
        let incidents = stmt
            .query_map(params![per_page, (page - 1) * per_page], row_to_incident)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok((incidents, total))
    }

    /// Get an incident by ID.
    pub fn get_incident(&self, id: i64) -> Result<Incident, DbError> {
        let conn = self.conn.lock().unwrap();
        fetch_incident(&conn, id)
    }

    /// Create an incident and return it.
    pub fn create_incident(&self, new: &NewIncident) -> Result<Incident, DbError> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_time(Utc::now());
        conn.execute(
            "INSERT INTO incidents (component_id, name, status, message, visible, user_id, scheduled_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new.component_id,
                new.name,
                new.status,
                new.message,
                new.visible as i64,
                new.user_id,
                new.scheduled_at.map(fmt_time),
                now,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        fetch_incident(&conn, id)
    }

    /// Update an incident row.
    pub fn update_incident(&self, incident: &Incident) -> Result<Incident, DbError> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_time(Utc::now());
        let changed = conn.execute(
            "UPDATE incidents
             SET component_id=?1, name=?2, status=?3, message=?4, visible=?5, scheduled_at=?6, updated_at=?7
             WHERE id=?8",
            params![
                incident.component_id,
                incident.name,
                incident.status,
                incident.message,
                incident.visible as i64,
                incident.scheduled_at.map(fmt_time),
                now,
                incident.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        fetch_incident(&conn, incident.id)
    }

    /// Delete an incident.
    pub fn delete_incident(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM incidents WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // --- Metrics ---

    /// Get one page of metrics plus the total row count.
    pub fn paginate_metrics(&self, page: i64, per_page: i64) -> Result<(Vec<Metric>, i64), DbError> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM metrics", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT id, name, suffix, description, default_value, calc_type, display_chart, places, default_view, threshold, sort_order, created_at, updated_at
             FROM metrics ORDER BY sort_order ASC, id ASC LIMIT ?1 OFFSET ?2",
        )?;
        let metrics = stmt
            .query_map(params![per_page, (page - 1) * per_page], row_to_metric)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok((metrics, total))
    }

    /// Get a metric by ID.
    pub fn get_metric(&self, id: i64) -> Result<Metric, DbError> {
        let conn = self.conn.lock().unwrap();
        fetch_metric(&conn, id)
    }

    /// Create a metric and return it.
    pub fn create_metric(&self, new: &NewMetric) -> Result<Metric, DbError> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_time(Utc::now());
        conn.execute(
            "INSERT INTO metrics (name, suffix, description, default_value, calc_type, display_chart, places, default_view, threshold, sort_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                new.name,
                new.suffix,
                new.description,
                new.default_value,
                new.calc_type,
                new.display_chart as i64,
                new.places,
                new.default_view,
                new.threshold,
                new.order,
                now,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        fetch_metric(&conn, id)
    }

    /// Update a metric row.
    pub fn update_metric(&self, metric: &Metric) -> Result<Metric, DbError> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_time(Utc::now());
        let changed = conn.execute(
            "UPDATE metrics
             SET name=?1, suffix=?2, description=?3, default_value=?4, calc_type=?5, display_chart=?6, places=?7, default_view=?8, threshold=?9, sort_order=?10, updated_at=?11
             WHERE id=?12",
            params![
                metric.name,
                metric.suffix,
                metric.description,
                metric.default_value,
                metric.calc_type,
                metric.display_chart as i64,
                metric.places,
                metric.default_view,
                metric.threshold,
                metric.order,
                now,
                metric.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        fetch_metric(&conn, metric.id)
    }

    /// Delete a metric; its points go with it.
    pub fn delete_metric(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM metric_points WHERE metric_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM metrics WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        tx.commit()?;
        Ok(())
    }

    /// Get all points belonging to a metric, oldest first.
    pub fn metric_points(&self, metric_id: i64) -> Result<Vec<MetricPoint>, DbError> {
        let conn = self.conn.lock().unwrap();
        fetch_metric(&conn, metric_id)?;

        let mut stmt = conn.prepare(
            "SELECT id, metric_id, value, counter, created_at FROM metric_points
             WHERE metric_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let points = stmt
            .query_map(params![metric_id], row_to_metric_point)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(points)
    }

    // --- Metric points ---

    /// Get a point by ID, scoped to its parent metric. A point that exists
    /// under a different metric resolves as NotFound.
    pub fn get_metric_point(&self, metric_id: i64, point_id: i64) -> Result<MetricPoint, DbError> {
        let conn = self.conn.lock().unwrap();
        fetch_metric_point(&conn, metric_id, point_id)
    }

    /// Create a point under a metric. Missing metrics resolve as NotFound.
    pub fn create_metric_point(
        &self,
        metric_id: i64,
        value: f64,
        counter: i64,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<MetricPoint, DbError> {
        let conn = self.conn.lock().unwrap();
        fetch_metric(&conn, metric_id)?;

        let stamp = fmt_time(created_at.unwrap_or_else(Utc::now));
        conn.execute(
            "INSERT INTO metric_points (metric_id, value, counter, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![metric_id, value, counter, stamp],
        )?;
        let id = conn.last_insert_rowid();
        fetch_metric_point(&conn, metric_id, id)
    }

    /// Update a point in place. The parent metric id never changes, and
    /// the lookup is scoped by it.
    pub fn update_metric_point(&self, point: &MetricPoint) -> Result<MetricPoint, DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE metric_points SET value=?1, counter=?2, created_at=?3 WHERE id=?4 AND metric_id=?5",
            params![
                point.value,
                point.counter,
                fmt_time(point.created_at),
                point.id,
                point.metric_id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        fetch_metric_point(&conn, point.metric_id, point.id)
    }

    /// Delete a point, scoped to its parent metric.
    pub fn delete_metric_point(&self, metric_id: i64, point_id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM metric_points WHERE id = ?1 AND metric_id = ?2",
            params![point_id, metric_id],
        )?;
        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

// ============================================================================
// Tag resolution
// ============================================================================

/// Split a tag string on commas, tolerating one optional space on each side
/// of the comma. Tokens are otherwise used verbatim; empty tokens are
/// dropped, so an empty string resolves to an empty set.
fn split_tag_names(tag_string: &str) -> Vec<&str> {
    static TAG_SPLIT: OnceLock<Regex> = OnceLock::new();
    let re = TAG_SPLIT.get_or_init(|| Regex::new(" ?, ?").unwrap());
    re.split(tag_string).filter(|name| !name.is_empty()).collect()
}

/// Resolve each tag name to its row id, creating missing tags. The insert
/// races through the unique name index: a concurrent loser's INSERT OR
/// IGNORE is a no-op and the SELECT reads the winner's row.
fn resolve_tag_ids(conn: &Connection, tag_string: &str) -> Result<Vec<i64>, DbError> {
    let mut ids = Vec::new();
    for name in split_tag_names(tag_string) {
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
        let id: i64 = conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |r| r.get(0))?;
        ids.push(id);
    }
    Ok(ids)
}

/// Replace a component's association set with exactly the resolved set:
/// associations absent from the new set are removed, missing ones added,
/// unchanged ones left untouched.
fn sync_component_tags(conn: &Connection, component_id: i64, tag_string: &str) -> Result<(), DbError> {
    let tag_ids = resolve_tag_ids(conn, tag_string)?;

    if tag_ids.is_empty() {
        conn.execute("DELETE FROM component_tag WHERE component_id = ?1", params![component_id])?;
        return Ok(());
    }

    let placeholders = (2..tag_ids.len() + 2)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(
        &format!("DELETE FROM component_tag WHERE component_id = ?1 AND tag_id NOT IN ({})", placeholders),
        params_from_iter(std::iter::once(component_id).chain(tag_ids.iter().copied())),
    )?;

    for tag_id in &tag_ids {
        conn.execute(
            "INSERT OR IGNORE INTO component_tag (component_id, tag_id) VALUES (?1, ?2)",
            params![component_id, tag_id],
        )?;
    }
    Ok(())
}

fn load_component_tags(conn: &Connection, component_id: i64) -> Result<Vec<Tag>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name FROM tags t
         JOIN component_tag ct ON ct.tag_id = t.id
         WHERE ct.component_id = ?1 ORDER BY t.id ASC",
    )?;
    let tags = stmt
        .query_map(params![component_id], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<SqlResult<Vec<_>>>()?;
    Ok(tags)
}

// ============================================================================
// Row mapping
// ============================================================================

fn fetch_user(conn: &Connection, id: i64) -> Result<User, DbError> {
    conn.query_row(
        "SELECT id, username, api_key, created_at FROM users WHERE id = ?1",
        params![id],
        row_to_user,
    )
    .optional()?
    .ok_or(DbError::NotFound)
}

fn fetch_component(conn: &Connection, id: i64) -> Result<Component, DbError> {
    let mut component = conn
        .query_row(
            "SELECT id, name, description, status, link, sort_order, group_id, enabled, user_id, created_at, updated_at
             FROM components WHERE id = ?1",
            params![id],
            row_to_component,
        )
        .optional()?
        .ok_or(DbError::NotFound)?;
    component.tags = load_component_tags(conn, id)?;
    Ok(component)
}

fn fetch_incident(conn: &Connection, id: i64) -> Result<Incident, DbError> {
    conn.query_row(
        "SELECT id, component_id, name, status, message, visible, user_id, scheduled_at, created_at, updated_at
         FROM incidents WHERE id = ?1",
        params![id],
        row_to_incident,
    )
    .optional()?
    .ok_or(DbError::NotFound)
}

fn fetch_metric(conn: &Connection, id: i64) -> Result<Metric, DbError> {
    conn.query_row(
        "SELECT id, name, suffix, description, default_value, calc_type, display_chart, places, default_view, threshold, sort_order, created_at, updated_at
         FROM metrics WHERE id = ?1",
        params![id],
        row_to_metric,
    )
    .optional()?
    .ok_or(DbError::NotFound)
}

fn fetch_metric_point(conn: &Connection, metric_id: i64, point_id: i64) -> Result<MetricPoint, DbError> {
    conn.query_row(
        "SELECT id, metric_id, value, counter, created_at FROM metric_points
         WHERE id = ?1 AND metric_id = ?2",
        params![point_id, metric_id],
        row_to_metric_point,
    )
    .optional()?
    .ok_or(DbError::NotFound)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> SqlResult<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        api_key: row.get(2)?,
        created_at: get_time(row, 3)?,
    })
}

fn row_to_component(row: &rusqlite::Row<'_>) -> SqlResult<Component> {
    Ok(Component {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        link: row.get(4)?,
        order: row.get(5)?,
        group_id: row.get(6)?,
        enabled: row.get::<_, i64>(7)? != 0,
        user_id: row.get(8)?,
        created_at: get_time(row, 9)?,
        updated_at: get_time(row, 10)?,
        tags: Vec::new(),
    })
}

fn row_to_incident(row: &rusqlite::Row<'_>) -> SqlResult<Incident> {
    Ok(Incident {
        id: row.get(0)?,
        component_id: row.get(1)?,
        name: row.get(2)?,
        status: row.get(3)?,
        message: row.get(4)?,
        visible: row.get::<_, i64>(5)? != 0,
        user_id: row.get(6)?,
        scheduled_at: get_opt_time(row, 7)?,
        created_at: get_time(row, 8)?,
        updated_at: get_time(row, 9)?,
    })
}

fn row_to_metric(row: &rusqlite::Row<'_>) -> SqlResult<Metric> {
    Ok(Metric {
        id: row.get(0)?,
        name: row.get(1)?,
        suffix: row.get(2)?,
        description: row.get(3)?,
        default_value: row.get(4)?,
        calc_type: row.get(5)?,
        display_chart: row.get::<_, i64>(6)? != 0,
        places: row.get(7)?,
        default_view: row.get(8)?,
        threshold: row.get(9)?,
        order: row.get(10)?,
        created_at: get_time(row, 11)?,
        updated_at: get_time(row, 12)?,
    })
}

fn row_to_metric_point(row: &rusqlite::Row<'_>) -> SqlResult<MetricPoint> {
    Ok(MetricPoint {
        id: row.get(0)?,
        metric_id: row.get(1)?,
        value: row.get(2)?,
        counter: row.get(3)?,
        created_at: get_time(row, 4)?,
    })
}

fn get_time(row: &rusqlite::Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    Ok(parse_db_time(&s).unwrap_or_else(Utc::now))
}

fn get_opt_time(row: &rusqlite::Row<'_>, idx: usize) -> SqlResult<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.and_then(|s| parse_db_time(&s)))
}

/// Format a datetime for storage.
fn fmt_time(dt: DateTime<Utc>) -> String {
    dt.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    // Try various formats
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    // Try ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
