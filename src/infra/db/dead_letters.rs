use async_trait::async_trait;

use crate::application::repos::{DeadLetterRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl DeadLetterRepo for PostgresRepositories {
    async fn record_dead_letter(
        &self,
        payload: &str,
        reason: &str,
        attempts: u32,
    ) -> Result<(), RepoError> {
        let attempts = i32::try_from(attempts).unwrap_or(i32::MAX);

        sqlx::query(
            r#"
            INSERT INTO ingest_dead_letters (payload, reason, attempts)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(payload)
        .bind(reason)
        .bind(attempts)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
