//! HTTP request handlers.
//!
//! Each handler resolves its target with an explicit store lookup, runs the
//! validation policy for its context, and delegates persistence to the
//! store. Tag strings never reach the component row itself.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::auth::AuthUser;
use super::envelope::{Collection, Item, Paginated};
use super::error::ApiError;
use super::AppState;
use crate::db::{
    ComponentPayload, IncidentPayload, MetricPayload, MetricPointPayload, NewComponent,
    NewIncident, NewMetric,
};
use crate::validation::{self, ValidationContext, ValidationError};

/// Page size applied when the request does not supply `per_page`.
const DEFAULT_PER_PAGE: i64 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

fn page_params(query: &PageQuery) -> (i64, i64) {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
    (page, per_page)
}

fn parse_timestamp(timestamp: Option<i64>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match timestamp {
        None => Ok(None),
        Some(ts) => DateTime::from_timestamp(ts, 0)
            .map(Some)
            .ok_or_else(|| {
                ApiError::Validation(ValidationError {
                    errors: vec!["timestamp is out of range".to_string()],
                })
            }),
    }
}

// ============================================================================
// Components
// ============================================================================

pub async fn list_components(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = page_params(&query);
    let (components, total) = state.store.paginate_components(page, per_page)?;
    Ok(Json(Paginated::new("/components", page, per_page, total, components)))
}

pub async fn get_component(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let component = state.store.get_component(id)?;
    Ok(Json(Item { data: component }))
}

pub async fn create_component(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ComponentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_component(&payload, ValidationContext::Creating)?;

    let new = NewComponent {
        name: payload.name.unwrap_or_default(),
        description: payload.description.unwrap_or_default(),
        status: payload.status.unwrap_or(1),
        link: payload.link.unwrap_or_default(),
        order: payload.order.unwrap_or(0),
        group_id: payload.group_id,
        enabled: payload.enabled.unwrap_or(true),
        user_id: user.id,
    };
    let component = state.store.create_component(&new, payload.tags.as_deref())?;
    Ok((StatusCode::CREATED, Json(Item { data: component })))
}

pub async fn update_component(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ComponentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut component = state.store.get_component(id)?;
    validation::validate_component(&payload, ValidationContext::Updating)?;

    if let Some(name) = payload.name {
        component.name = name;
    }
    if let Some(description) = payload.description {
        component.description = description;
    }
    if let Some(status) = payload.status {
        component.status = status;
    }
    if let Some(link) = payload.link {
        component.link = link;
    }
    if let Some(order) = payload.order {
        component.order = order;
    }
    if payload.group_id.is_some() {
        component.group_id = payload.group_id;
    }
    if let Some(enabled) = payload.enabled {
        component.enabled = enabled;
    }

    let component = state.store.update_component(&component, payload.tags.as_deref())?;
    Ok(Json(Item { data: component }))
}

pub async fn delete_component(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_component(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Incidents
// ============================================================================

pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = page_params(&query);
    let (incidents, total) = state.store.paginate_incidents(page, per_page)?;
    Ok(Json(Paginated::new("/incidents", page, per_page, total, incidents)))
}

pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let incident = state.store.get_incident(id)?;
    Ok(Json(Item { data: incident }))
}

pub async fn create_incident(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<IncidentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_incident(&payload, ValidationContext::Creating)?;

    // The acting user owns the incident; a client-sent user_id is ignored.
    let new = NewIncident {
        component_id: payload.component_id,
        name: payload.name.unwrap_or_default(),
        status: payload.status.unwrap_or(1),
        message: payload.message.unwrap_or_default(),
        visible: payload.visible.unwrap_or(true),
        user_id: user.id,
        scheduled_at: payload.scheduled_at,
    };
    let incident = state.store.create_incident(&new)?;
    Ok((StatusCode::CREATED, Json(Item { data: incident })))
}

pub async fn update_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<IncidentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut incident = state.store.get_incident(id)?;
    validation::validate_incident(&payload, ValidationContext::Updating)?;

    if payload.component_id.is_some() {
        incident.component_id = payload.component_id;
    }
    if let Some(name) = payload.name {
        incident.name = name;
    }
    if let Some(status) = payload.status {
        incident.status = status;
    }
    if let Some(message) = payload.message {
        incident.message = message;
    }
    if let Some(visible) = payload.visible {
        incident.visible = visible;
    }
    if payload.scheduled_at.is_some() {
        incident.scheduled_at = payload.scheduled_at;
    }

    let incident = state.store.update_incident(&incident)?;
    Ok(Json(Item { data: incident }))
}

pub async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_incident(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Metrics
// ============================================================================

pub async fn list_metrics(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = page_params(&query);
    let (metrics, total) = state.store.paginate_metrics(page, per_page)?;
    Ok(Json(Paginated::new("/metrics", page, per_page, total, metrics)))
}

pub async fn get_metric(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let metric = state.store.get_metric(id)?;
    Ok(Json(Item { data: metric }))
}

pub async fn create_metric(
    State(state): State<AppState>,
    Json(payload): Json<MetricPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_metric(&payload, ValidationContext::Creating)?;

    let new = NewMetric {
        name: payload.name.unwrap_or_default(),
        suffix: payload.suffix.unwrap_or_default(),
        description: payload.description.unwrap_or_default(),
        default_value: payload.default_value.unwrap_or(0.0),
        calc_type: payload.calc_type.unwrap_or(0),
        display_chart: payload.display_chart.unwrap_or(true),
        places: payload.places.unwrap_or(2),
        default_view: payload.default_view.unwrap_or(0),
        threshold: payload.threshold.unwrap_or(5),
        order: payload.order.unwrap_or(0),
    };
    let metric = state.store.create_metric(&new)?;
    Ok((StatusCode::CREATED, Json(Item { data: metric })))
}

pub async fn update_metric(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<MetricPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut metric = state.store.get_metric(id)?;
    validation::validate_metric(&payload, ValidationContext::Updating)?;

    if let Some(name) = payload.name {
        metric.name = name;
    }
    if let Some(suffix) = payload.suffix {
        metric.suffix = suffix;
    }
    if let Some(description) = payload.description {
        metric.description = description;
    }
    if let Some(default_value) = payload.default_value {
        metric.default_value = default_value;
    }
    if let Some(calc_type) = payload.calc_type {
        metric.calc_type = calc_type;
    }
    if let Some(display_chart) = payload.display_chart {
        metric.display_chart = display_chart;
    }
    if let Some(places) = payload.places {
        metric.places = places;
    }
    if let Some(default_view) = payload.default_view {
        metric.default_view = default_view;
    }
    if let Some(threshold) = payload.threshold {
        metric.threshold = threshold;
    }
    if let Some(order) = payload.order {
        metric.order = order;
    }

    let metric = state.store.update_metric(&metric)?;
    Ok(Json(Item { data: metric }))
}

pub async fn delete_metric(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_metric(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Metric points
// ============================================================================

pub async fn list_metric_points(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let points = state.store.metric_points(id)?;
    Ok(Json(Collection { data: points }))
}

pub async fn get_metric_point(
    State(state): State<AppState>,
    Path((metric_id, point_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let point = state.store.get_metric_point(metric_id, point_id)?;
    Ok(Json(Item { data: point }))
}

pub async fn create_metric_point(
    State(state): State<AppState>,
    Path(metric_id): Path<i64>,
    Json(payload): Json<MetricPointPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_metric_point(&payload, ValidationContext::Creating)?;

    let created_at = parse_timestamp(payload.timestamp)?;
    let point = state.store.create_metric_point(
        metric_id,
        payload.value.unwrap_or(0.0),
        payload.counter.unwrap_or(1),
        created_at,
    )?;
    Ok((StatusCode::CREATED, Json(Item { data: point })))
}

pub async fn update_metric_point(
    State(state): State<AppState>,
    Path((metric_id, point_id)): Path<(i64, i64)>,
    Json(payload): Json<MetricPointPayload>,
) -> Result<impl IntoResponse, ApiError> {
    // Scoped lookup: a point under a different metric is NotFound.
    let mut point = state.store.get_metric_point(metric_id, point_id)?;
    validation::validate_metric_point(&payload, ValidationContext::Updating)?;

    if let Some(value) = payload.value {
        point.value = value;
    }
    if let Some(counter) = payload.counter {
        point.counter = counter;
    }
    if let Some(created_at) = parse_timestamp(payload.timestamp)? {
        point.created_at = created_at;
    }

    let point = state.store.update_metric_point(&point)?;
    Ok(Json(Item { data: point }))
}

pub async fn delete_metric_point(
    State(state): State<AppState>,
    Path((metric_id, point_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_metric_point(metric_id, point_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::config::ServerConfig;
    use crate::db::Store;
    use crate::web::{router, AppState};

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn test_app() -> (NamedTempFile, Router, Arc<Store>) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        store.create_user("admin", TOKEN).unwrap();
        let state = AppState {
            config: ServerConfig::default(),
            store: store.clone(),
        };
        (tmp, router(state), store)
    }

    async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("X-Api-Token", token);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_create_component_with_tags() {
        let (_tmp, app, _store) = test_app();

        let (status, body) = send(
            &app,
            "POST",
            "/components",
            Some(TOKEN),
            Some(json!({"name": "API", "status": 1, "tags": "core,public"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let tags = body["data"]["tags"].as_array().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0]["name"], "core");
        assert_eq!(tags[1]["name"], "public");
        let core_id = tags[0]["id"].as_i64().unwrap();

        // A second component referencing "core" reuses the same tag row.
        let (status, body) = send(
            &app,
            "POST",
            "/components",
            Some(TOKEN),
            Some(json!({"name": "API2", "status": 1, "tags": "core"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["tags"][0]["id"].as_i64().unwrap(), core_id);
    }

    #[tokio::test]
    async fn test_component_without_tags_has_empty_set() {
        let (_tmp, app, _store) = test_app();

        let (status, body) = send(
            &app,
            "POST",
            "/components",
            Some(TOKEN),
            Some(json!({"name": "API", "status": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = send(&app, "GET", &format!("/components/{}", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tags"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_invalid_component_leaves_no_partial_record() {
        let (_tmp, app, _store) = test_app();

        let (status, _) = send(&app, "POST", "/components", Some(TOKEN), Some(json!({"status": 1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "GET", "/components", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn test_mutations_require_token() {
        let (_tmp, app, _store) = test_app();

        let payload = json!({"name": "API", "status": 1});
        let (status, _) = send(&app, "POST", "/components", None, Some(payload.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "POST", "/components", Some("wrong"), Some(payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Reads stay public.
        let (status, _) = send(&app, "GET", "/components", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_incident_owner_comes_from_token() {
        let (_tmp, app, store) = test_app();
        let admin = store.get_user_by_api_key(TOKEN).unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/incidents",
            Some(TOKEN),
            Some(json!({"name": "Outage", "message": "Looking into it", "status": 1, "user_id": 999})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["user_id"].as_i64().unwrap(), admin.id);
    }

    #[tokio::test]
    async fn test_component_update_resyncs_tags() {
        let (_tmp, app, _store) = test_app();

        let (_, body) = send(
            &app,
            "POST",
            "/components",
            Some(TOKEN),
            Some(json!({"name": "API", "status": 1, "tags": "a,b"})),
        )
        .await;
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/components/{}", id),
            Some(TOKEN),
            Some(json!({"tags": "b,c"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"]["tags"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_metric_point_update_is_scoped() {
        let (_tmp, app, _store) = test_app();

        let metric = json!({"name": "Latency", "suffix": "ms", "default_value": 0});
        let (_, body) = send(&app, "POST", "/metrics", Some(TOKEN), Some(metric.clone())).await;
        let metric_a = body["data"]["id"].as_i64().unwrap();
        let (_, body) = send(&app, "POST", "/metrics", Some(TOKEN), Some(metric)).await;
        let metric_b = body["data"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/metrics/{}/points", metric_a),
            Some(TOKEN),
            Some(json!({"value": 12.5})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let point = body["data"]["id"].as_i64().unwrap();

        // Addressing the point through the wrong metric is a 404.
        let (status, _) = send(
            &app,
            "PUT",
            &format!("/metrics/{}/points/{}", metric_b, point),
            Some(TOKEN),
            Some(json!({"value": 42})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/metrics/{}/points/{}", metric_a, point),
            Some(TOKEN),
            Some(json!({"value": 42})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["value"].as_f64().unwrap(), 42.0);
    }

    #[tokio::test]
    async fn test_metric_points_listing() {
        let (_tmp, app, _store) = test_app();

        let (_, body) = send(
            &app,
            "POST",
            "/metrics",
            Some(TOKEN),
            Some(json!({"name": "Latency", "suffix": "ms", "default_value": 0})),
        )
        .await;
        let metric = body["data"]["id"].as_i64().unwrap();

        for value in [1.0, 2.0] {
            send(
                &app,
                "POST",
                &format!("/metrics/{}/points", metric),
                Some(TOKEN),
                Some(json!({"value": value})),
            )
            .await;
        }

        let (status, body) = send(&app, "GET", &format!("/metrics/{}/points", metric), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (status, _) = send(&app, "GET", "/metrics/999/points", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_component() {
        let (_tmp, app, _store) = test_app();

        let (_, body) = send(
            &app,
            "POST",
            "/components",
            Some(TOKEN),
            Some(json!({"name": "API", "status": 1})),
        )
        .await;
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = send(&app, "DELETE", &format!("/components/{}", id), Some(TOKEN), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, serde_json::Value::Null);

        let (status, _) = send(&app, "GET", &format!("/components/{}", id), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_resources_return_not_found() {
        let (_tmp, app, _store) = test_app();
        for uri in ["/components/99", "/incidents/99", "/metrics/99", "/metrics/1/points/99"] {
            let (status, _) = send(&app, "GET", uri, None, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_list_defaults_to_twenty_per_page() {
        let (_tmp, app, store) = test_app();
        let admin = store.get_user_by_api_key(TOKEN).unwrap();

        for i in 0..25 {
            store
                .create_component(
                    &crate::db::NewComponent {
                        name: format!("svc-{}", i),
                        description: String::new(),
                        status: 1,
                        link: String::new(),
                        order: 0,
                        group_id: None,
                        enabled: true,
                        user_id: admin.id,
                    },
                    None,
                )
                .unwrap();
        }

        let (status, body) = send(&app, "GET", "/components", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 20);
        let pagination = &body["meta"]["pagination"];
        assert_eq!(pagination["per_page"], 20);
        assert_eq!(pagination["total"], 25);
        assert_eq!(pagination["total_pages"], 2);
        assert_eq!(pagination["links"]["next_page"], "/components?page=2&per_page=20");

        let (_, body) = send(&app, "GET", "/components?page=2&per_page=20", None, None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_incident_update_validates_supplied_fields() {
        let (_tmp, app, _store) = test_app();

        let (_, body) = send(
            &app,
            "POST",
            "/incidents",
            Some(TOKEN),
            Some(json!({"name": "Outage", "message": "m", "status": 1})),
        )
        .await;
        let id = body["data"]["id"].as_i64().unwrap();

        // Partial update with only a status is fine.
        let (status, body) = send(
            &app,
            "PUT",
            &format!("/incidents/{}", id),
            Some(TOKEN),
            Some(json!({"status": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], 4);

        // An out-of-range status is rejected and nothing changes.
        let (status, _) = send(
            &app,
            "PUT",
            &format!("/incidents/{}", id),
            Some(TOKEN),
            Some(json!({"status": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, "GET", &format!("/incidents/{}", id), None, None).await;
        assert_eq!(body["data"]["status"], 4);
    }
}
