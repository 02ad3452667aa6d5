//! Integration descriptor domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use shared::validation::{validate_absolute_http_url, validate_integration_name};

/// One downstream third-party API managed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    /// Unique across all integrations.
    pub name: String,
    /// Free-form grouping: payment, email, sms, address, weather, ...
    pub category: String,
    /// Absolute http(s) URL all dispatches for this integration target.
    pub base_url: String,
    pub active: bool,
    pub config: IntegrationConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed per-integration tunables.
///
/// Named options get compile-time-checked access; anything
/// provider-specific lands in the flattened extension map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Per-integration dispatch timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Rate-limit hint for callers. Carried in config only; the gateway
    /// does not enforce it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,

    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Request payload for registering an integration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateIntegrationRequest {
    #[validate(custom(function = "validate_integration_name"))]
    pub name: String,

    #[validate(length(min = 1, max = 50, message = "Category must be 1-50 characters"))]
    pub category: String,

    #[validate(custom(function = "validate_absolute_http_url"))]
    pub base_url: String,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub config: IntegrationConfig,
}

fn default_active() -> bool {
    true
}

/// Filters for listing integrations. Absent fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegrationFilter {
    pub active: Option<bool>,
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_validation() {
        let valid = CreateIntegrationRequest {
            name: "stripe".to_string(),
            category: "payment".to_string(),
            base_url: "https://api.stripe.com".to_string(),
            active: true,
            config: IntegrationConfig::default(),
        };
        assert!(valid.validate().is_ok());

        let bad_url = CreateIntegrationRequest {
            base_url: "not-a-url".to_string(),
            ..valid.clone()
        };
        assert!(bad_url.validate().is_err());

        let bad_name = CreateIntegrationRequest {
            name: "Bad Name!".to_string(),
            ..valid
        };
        assert!(bad_name.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_named_and_extra_keys() {
        let config: IntegrationConfig = serde_json::from_value(json!({
            "timeout_ms": 5000,
            "rate_limit_per_minute": 120,
            "api_version": "2024-06-20"
        }))
        .unwrap();

        assert_eq!(config.timeout_ms, Some(5000));
        assert_eq!(config.rate_limit_per_minute, Some(120));
        assert_eq!(config.extra.get("api_version"), Some(&json!("2024-06-20")));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config: IntegrationConfig =
            serde_json::from_value(json!({ "timeout_ms": 2000, "region": "eu-west-1" })).unwrap();
        let value = serde_json::to_value(&config).unwrap();
        let back: IntegrationConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: IntegrationConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, IntegrationConfig::default());
    }
}
