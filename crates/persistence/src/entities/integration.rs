//! Integration entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::{Integration, IntegrationConfig};

/// Database row mapping for the integrations table.
#[derive(Debug, Clone, FromRow)]
pub struct IntegrationEntity {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub base_url: String,
    pub active: bool,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<IntegrationEntity> for Integration {
    fn from(entity: IntegrationEntity) -> Self {
        // Config was validated on write; anything unreadable degrades to
        // defaults rather than failing the whole lookup.
        let config: IntegrationConfig =
            serde_json::from_value(entity.config).unwrap_or_default();

        Self {
            id: entity.id,
            name: entity.name,
            category: entity.category,
            base_url: entity.base_url,
            active: entity.active,
            config,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
