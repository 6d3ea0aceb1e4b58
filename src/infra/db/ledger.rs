use async_trait::async_trait;

use crate::application::repos::{CacheLedgerRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl CacheLedgerRepo for PostgresRepositories {
    async fn append_ledger(&self, order_uid: &str, instance_key: &str) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO cache (order_uid, app_key)
            VALUES ($1, $2)
            "#,
        )
        .bind(order_uid)
        .bind(instance_key)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn query_ledger(
        &self,
        instance_key: &str,
        limit: usize,
    ) -> Result<Vec<String>, RepoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        sqlx::query_scalar(
            r#"
            SELECT order_uid
            FROM cache
            WHERE app_key = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(instance_key)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn clear_ledger(&self, instance_key: &str) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM cache
            WHERE app_key = $1
            "#,
        )
        .bind(instance_key)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn count_ledger(&self, instance_key: &str) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM cache
            WHERE app_key = $1
            "#,
        )
        .bind(instance_key)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}
