//! Integration repository for database operations.

use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{CreateIntegrationRequest, Integration, IntegrationFilter};

use crate::entities::IntegrationEntity;
use crate::metrics::QueryTimer;

const INTEGRATION_COLUMNS: &str =
    "id, name, category, base_url, active, config, created_at, updated_at";

/// Repository for integration database operations.
#[derive(Clone)]
pub struct IntegrationRepository {
    pool: PgPool,
}

impl IntegrationRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new integration. Name uniqueness is enforced by the
    /// database.
    pub async fn insert(
        &self,
        request: &CreateIntegrationRequest,
    ) -> Result<Integration, sqlx::Error> {
        let timer = QueryTimer::new("insert_integration");
        let config = serde_json::to_value(&request.config)
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let entity = sqlx::query_as::<_, IntegrationEntity>(&format!(
            r#"
            INSERT INTO integrations (name, category, base_url, active, config)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {INTEGRATION_COLUMNS}
            "#,
        ))
        .bind(&request.name)
        .bind(&request.category)
        .bind(&request.base_url)
        .bind(request.active)
        .bind(config)
        .fetch_one(&self.pool)
        .await?;
        timer.record();

        Ok(entity.into())
    }

    /// Find an integration by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Integration>, sqlx::Error> {
        let timer = QueryTimer::new("find_integration_by_id");
        let entity = sqlx::query_as::<_, IntegrationEntity>(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        timer.record();

        Ok(entity.map(Into::into))
    }

    /// Find an integration by its unique name.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Integration>, sqlx::Error> {
        let timer = QueryTimer::new("find_integration_by_name");
        let entity = sqlx::query_as::<_, IntegrationEntity>(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations WHERE name = $1",
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        timer.record();

        Ok(entity.map(Into::into))
    }

    /// List integrations matching the filter, ordered by name.
    pub async fn list(&self, filter: &IntegrationFilter) -> Result<Vec<Integration>, sqlx::Error> {
        let timer = QueryTimer::new("list_integrations");

        let mut conditions = Vec::new();
        let mut param_count = 0;
        if filter.active.is_some() {
            param_count += 1;
            conditions.push(format!("active = ${}", param_count));
        }
        if filter.category.is_some() {
            param_count += 1;
            conditions.push(format!("category = ${}", param_count));
        }
        let where_clause = if conditions.is_empty() {
            "TRUE".to_string()
        } else {
            conditions.join(" AND ")
        };

        let query = format!(
            "SELECT {INTEGRATION_COLUMNS} FROM integrations WHERE {where_clause} ORDER BY name ASC",
        );

        let mut builder = sqlx::query_as::<_, IntegrationEntity>(&query);
        if let Some(active) = filter.active {
            builder = builder.bind(active);
        }
        if let Some(ref category) = filter.category {
            builder = builder.bind(category.clone());
        }

        let entities = builder.fetch_all(&self.pool).await?;
        timer.record();

        Ok(entities.into_iter().map(Into::into).collect())
    }

    /// Toggle the active flag. Returns false when the id is unknown.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("set_integration_active");
        let result = sqlx::query(
            "UPDATE integrations SET active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(active)
        .execute(&self.pool)
        .await?;
        timer.record();

        Ok(result.rows_affected() > 0)
    }
}
