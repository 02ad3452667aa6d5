//! Request log repository for database operations.
//!
//! The log is append-only: inserts and reads, no updates or deletes.

use sqlx::PgPool;

use domain::models::{NewRequestLogEntry, RequestLogEntry, RequestLogQuery, RequestLogStats};

use crate::entities::RequestLogEntity;
use crate::metrics::QueryTimer;

const LOG_COLUMNS: &str = "id, integration_id, request_id, method, endpoint, \
     request_headers, request_body, response_status, response_headers, response_body, \
     error_message, duration_ms, created_at";

/// Default page size when a query does not set a limit.
const DEFAULT_LIMIT: i64 = 100;

/// Helper struct for building dynamic WHERE clauses from log query
/// filters. Tracks conditions and parameter positions to avoid code
/// duplication between the list, count and aggregate queries.
struct LogFilterBuilder {
    conditions: Vec<String>,
    param_count: i32,
}

impl LogFilterBuilder {
    fn build(query: &RequestLogQuery) -> Self {
        let mut conditions = Vec::new();
        let mut param_count = 0;

        if query.integration_id.is_some() {
            param_count += 1;
            conditions.push(format!("integration_id = ${}", param_count));
        }
        if query.method.is_some() {
            param_count += 1;
            conditions.push(format!("UPPER(method) = UPPER(${})", param_count));
        }
        if query.status.is_some() {
            param_count += 1;
            conditions.push(format!("response_status = ${}", param_count));
        }
        if query.status_min.is_some() {
            param_count += 1;
            conditions.push(format!("response_status >= ${}", param_count));
        }
        if query.status_max.is_some() {
            param_count += 1;
            conditions.push(format!("response_status <= ${}", param_count));
        }
        if query.min_duration_ms.is_some() {
            param_count += 1;
            conditions.push(format!("duration_ms >= ${}", param_count));
        }
        if query.max_duration_ms.is_some() {
            param_count += 1;
            conditions.push(format!("duration_ms <= ${}", param_count));
        }
        if query.from.is_some() {
            param_count += 1;
            conditions.push(format!("created_at >= ${}", param_count));
        }
        if query.to.is_some() {
            param_count += 1;
            conditions.push(format!("created_at <= ${}", param_count));
        }
        match query.has_error {
            Some(true) => conditions.push("error_message IS NOT NULL".to_string()),
            Some(false) => conditions.push("error_message IS NULL".to_string()),
            None => {}
        }

        Self {
            conditions,
            param_count,
        }
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            "TRUE".to_string()
        } else {
            self.conditions.join(" AND ")
        }
    }

    fn param_count(&self) -> i32 {
        self.param_count
    }
}

/// Macro to bind query filter parameters to a SQLx builder, in the same
/// order the filter builder assigned positions.
macro_rules! bind_log_filters {
    ($builder:expr, $query:expr) => {{
        let mut b = $builder;
        if let Some(integration_id) = $query.integration_id {
            b = b.bind(integration_id);
        }
        if let Some(ref method) = $query.method {
            b = b.bind(method.clone());
        }
        if let Some(status) = $query.status {
            b = b.bind(status);
        }
        if let Some(status_min) = $query.status_min {
            b = b.bind(status_min);
        }
        if let Some(status_max) = $query.status_max {
            b = b.bind(status_max);
        }
        if let Some(min_duration) = $query.min_duration_ms {
            b = b.bind(min_duration);
        }
        if let Some(max_duration) = $query.max_duration_ms {
            b = b.bind(max_duration);
        }
        if let Some(from) = $query.from {
            b = b.bind(from);
        }
        if let Some(to) = $query.to {
            b = b.bind(to);
        }
        b
    }};
}

#[derive(Debug, sqlx::FromRow)]
struct TotalsRow {
    total: i64,
    avg_duration_ms: Option<f64>,
    errors: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct StatusCountRow {
    response_status: Option<i32>,
    count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct MethodCountRow {
    method: String,
    count: i64,
}

/// Repository for request log database operations.
#[derive(Clone)]
pub struct RequestLogRepository {
    pool: PgPool,
}

impl RequestLogRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a log entry.
    pub async fn insert(&self, entry: NewRequestLogEntry) -> Result<RequestLogEntry, sqlx::Error> {
        let timer = QueryTimer::new("insert_request_log");
        let entity = sqlx::query_as::<_, RequestLogEntity>(&format!(
            r#"
            INSERT INTO request_logs (
                integration_id, request_id, method, endpoint, request_headers,
                request_body, response_status, response_headers, response_body,
                error_message, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {LOG_COLUMNS}
            "#,
        ))
        .bind(entry.integration_id)
        .bind(entry.request_id)
        .bind(&entry.method)
        .bind(&entry.endpoint)
        .bind(&entry.request_headers)
        .bind(&entry.request_body)
        .bind(entry.response_status)
        .bind(&entry.response_headers)
        .bind(&entry.response_body)
        .bind(&entry.error_message)
        .bind(entry.duration_ms)
        .fetch_one(&self.pool)
        .await?;
        timer.record();

        Ok(entity.into())
    }

    /// List log entries matching the query's filters and ordering.
    pub async fn list(&self, query: &RequestLogQuery) -> Result<Vec<RequestLogEntry>, sqlx::Error> {
        let timer = QueryTimer::new("list_request_logs");

        let filter = LogFilterBuilder::build(query);
        let where_clause = filter.where_clause();
        let param_count = filter.param_count();

        let direction = if query.descending { "DESC" } else { "ASC" };
        let list_query = format!(
            "SELECT {LOG_COLUMNS} FROM request_logs WHERE {where_clause} \
             ORDER BY {order} {direction} LIMIT ${limit_pos} OFFSET ${offset_pos}",
            order = query.order_by.as_sql(),
            limit_pos = param_count + 1,
            offset_pos = param_count + 2,
        );

        let builder = sqlx::query_as::<_, RequestLogEntity>(&list_query);
        let builder = bind_log_filters!(builder, query);
        let entities = builder
            .bind(query.limit.unwrap_or(DEFAULT_LIMIT))
            .bind(query.offset.unwrap_or(0))
            .fetch_all(&self.pool)
            .await?;
        timer.record();

        Ok(entities.into_iter().map(Into::into).collect())
    }

    /// Aggregate statistics over all entries matching the query's
    /// filters (limit and offset do not apply).
    pub async fn stats(&self, query: &RequestLogQuery) -> Result<RequestLogStats, sqlx::Error> {
        let timer = QueryTimer::new("request_log_stats");

        let filter = LogFilterBuilder::build(query);
        let where_clause = filter.where_clause();

        let totals_query = format!(
            r#"
            SELECT COUNT(*)::bigint AS total,
                   AVG(duration_ms)::float8 AS avg_duration_ms,
                   COUNT(*) FILTER (
                       WHERE error_message IS NOT NULL OR response_status >= 400
                   )::bigint AS errors
            FROM request_logs
            WHERE {where_clause}
            "#,
        );
        let builder = sqlx::query_as::<_, TotalsRow>(&totals_query);
        let totals = bind_log_filters!(builder, query).fetch_one(&self.pool).await?;

        if totals.total == 0 {
            timer.record();
            return Ok(RequestLogStats::empty());
        }

        let status_query = format!(
            "SELECT response_status, COUNT(*)::bigint AS count FROM request_logs \
             WHERE {where_clause} GROUP BY response_status ORDER BY response_status",
        );
        let builder = sqlx::query_as::<_, StatusCountRow>(&status_query);
        let by_status = bind_log_filters!(builder, query).fetch_all(&self.pool).await?;

        let method_query = format!(
            "SELECT method, COUNT(*)::bigint AS count FROM request_logs \
             WHERE {where_clause} GROUP BY method ORDER BY method",
        );
        let builder = sqlx::query_as::<_, MethodCountRow>(&method_query);
        let by_method = bind_log_filters!(builder, query).fetch_all(&self.pool).await?;

        timer.record();

        Ok(RequestLogStats {
            total: totals.total,
            avg_duration_ms: totals.avg_duration_ms,
            error_rate_pct: (totals.errors as f64 / totals.total as f64) * 100.0,
            by_status: by_status
                .into_iter()
                .map(|row| (row.response_status, row.count))
                .collect(),
            by_method: by_method
                .into_iter()
                .map(|row| (row.method, row.count))
                .collect(),
        })
    }
}
