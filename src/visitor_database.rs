use sqlx::sqlite::SqlitePool;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct VisitorTracker {
    pool: SqlitePool,
}

impl VisitorTracker {
    pub fn new(pool: SqlitePool) -> VisitorTracker {
        VisitorTracker { pool }
    }

    /// Seeing the same id again is a no-op, including when two requests race.
    pub async fn record_visitor(&self, visitor_id: Option<&str>) -> AppResult<i64> {
        let visitor_id = match visitor_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(AppError::validation("Visitor ID is required")),
        };

        let inserted = sqlx::query("INSERT OR IGNORE INTO visitors (visitor_id) VALUES (?)")
            .bind(visitor_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if inserted > 0 {
            tracing::debug!("new visitor {}", visitor_id);
        }

        self.visitor_count().await
    }

    pub async fn visitor_count(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM visitors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
