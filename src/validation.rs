//! Per-entity validation rule sets.
//!
//! Create and update contexts apply different rules: creation requires the
//! entity's required fields, updates only validate the fields supplied.
//! Validation always runs before anything is written.

use thiserror::Error;

use crate::db::{ComponentPayload, IncidentPayload, MetricPayload, MetricPointPayload};

/// Whether a payload is creating a new record or updating an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationContext {
    Creating,
    Updating,
}

/// A failed validation, carrying one message per broken rule.
#[derive(Debug, Error)]
#[error("{}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

struct Rules {
    ctx: ValidationContext,
    errors: Vec<String>,
}

impl Rules {
    fn new(ctx: ValidationContext) -> Self {
        Self { ctx, errors: Vec::new() }
    }

    /// Required on create; on update the field may be absent.
    fn required<T>(&mut self, field: &str, value: &Option<T>) -> &mut Self {
        if self.ctx == ValidationContext::Creating && value.is_none() {
            self.errors.push(format!("{} is required", field));
        }
        self
    }

    fn non_empty(&mut self, field: &str, value: &Option<String>) -> &mut Self {
        if let Some(v) = value {
            if v.trim().is_empty() {
                self.errors.push(format!("{} must not be empty", field));
            }
        }
        self
    }

    fn in_range(&mut self, field: &str, value: Option<i64>, lo: i64, hi: i64) -> &mut Self {
        if let Some(v) = value {
            if v < lo || v > hi {
                self.errors.push(format!("{} must be between {} and {}", field, lo, hi));
            }
        }
        self
    }

    fn positive(&mut self, field: &str, value: Option<i64>) -> &mut Self {
        if let Some(v) = value {
            if v < 1 {
                self.errors.push(format!("{} must be positive", field));
            }
        }
        self
    }

    fn finite(&mut self, field: &str, value: Option<f64>) -> &mut Self {
        if let Some(v) = value {
            if !v.is_finite() {
                self.errors.push(format!("{} must be a finite number", field));
            }
        }
        self
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors: self.errors })
        }
    }
}

/// Validate a component payload.
pub fn validate_component(payload: &ComponentPayload, ctx: ValidationContext) -> Result<(), ValidationError> {
    let mut rules = Rules::new(ctx);
    rules
        .required("name", &payload.name)
        .non_empty("name", &payload.name)
        .required("status", &payload.status)
        .in_range("status", payload.status, 1, 4);
    rules.finish()
}

/// Validate an incident payload.
pub fn validate_incident(payload: &IncidentPayload, ctx: ValidationContext) -> Result<(), ValidationError> {
    let mut rules = Rules::new(ctx);
    rules
        .required("name", &payload.name)
        .non_empty("name", &payload.name)
        .required("message", &payload.message)
        .required("status", &payload.status)
        .in_range("status", payload.status, 0, 4);
    rules.finish()
}

/// Validate a metric payload.
pub fn validate_metric(payload: &MetricPayload, ctx: ValidationContext) -> Result<(), ValidationError> {
    let mut rules = Rules::new(ctx);
    rules
        .required("name", &payload.name)
        .non_empty("name", &payload.name)
        .required("suffix", &payload.suffix)
        .required("default_value", &payload.default_value)
        .finite("default_value", payload.default_value)
        .in_range("calc_type", payload.calc_type, 0, 1)
        .in_range("default_view", payload.default_view, 0, 3)
        .in_range("places", payload.places, 0, 10);
    rules.finish()
}

/// Validate a metric point payload.
pub fn validate_metric_point(payload: &MetricPointPayload, ctx: ValidationContext) -> Result<(), ValidationError> {
    let mut rules = Rules::new(ctx);
    rules
        .required("value", &payload.value)
        .finite("value", payload.value)
        .positive("counter", payload.counter);
    rules.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ValidationContext::{Creating, Updating};

    #[test]
    fn test_component_create_requires_name_and_status() {
        let err = validate_component(&ComponentPayload::default(), Creating).unwrap_err();
        assert_eq!(err.errors.len(), 2);

        let payload = ComponentPayload {
            name: Some("API".to_string()),
            status: Some(1),
            ..Default::default()
        };
        assert!(validate_component(&payload, Creating).is_ok());
    }

    #[test]
    fn test_component_update_allows_partial_payload() {
        assert!(validate_component(&ComponentPayload::default(), Updating).is_ok());

        let payload = ComponentPayload {
            status: Some(9),
            ..Default::default()
        };
        assert!(validate_component(&payload, Updating).is_err());
    }

    #[test]
    fn test_component_status_range() {
        for status in [0, 5] {
            let payload = ComponentPayload {
                name: Some("API".to_string()),
                status: Some(status),
                ..Default::default()
            };
            assert!(validate_component(&payload, Creating).is_err());
        }
    }

    #[test]
    fn test_incident_create_rules() {
        let err = validate_incident(&IncidentPayload::default(), Creating).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("name")));
        assert!(err.errors.iter().any(|e| e.contains("message")));
        assert!(err.errors.iter().any(|e| e.contains("status")));

        let payload = IncidentPayload {
            name: Some("Outage".to_string()),
            message: Some("Investigating".to_string()),
            status: Some(1),
            ..Default::default()
        };
        assert!(validate_incident(&payload, Creating).is_ok());
    }

    #[test]
    fn test_metric_rules() {
        let payload = MetricPayload {
            name: Some("Latency".to_string()),
            suffix: Some("ms".to_string()),
            default_value: Some(0.0),
            calc_type: Some(2),
            ..Default::default()
        };
        let err = validate_metric(&payload, Creating).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("calc_type")));
    }

    #[test]
    fn test_metric_point_rules() {
        assert!(validate_metric_point(&MetricPointPayload::default(), Creating).is_err());
        assert!(validate_metric_point(&MetricPointPayload::default(), Updating).is_ok());

        let payload = MetricPointPayload {
            value: Some(f64::NAN),
            ..Default::default()
        };
        assert!(validate_metric_point(&payload, Updating).is_err());
    }
}
