use chrono::Utc;
use sqlx::SqlitePool;

use super::{decode_error, parse_timestamp};
use crate::models::{ToolRecord, UserId};

pub struct ToolRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ToolRow {
    owner_id: String,
    tool_name: String,
    data: String,
    updated_at: String,
}

impl TryFrom<ToolRow> for ToolRecord {
    type Error = sqlx::Error;

    fn try_from(row: ToolRow) -> Result<Self, Self::Error> {
        Ok(ToolRecord {
            owner_id: UserId::new(row.owner_id),
            tool_name: row.tool_name,
            payload: serde_json::from_str(&row.data).map_err(|e| decode_error("data", e))?,
            updated_at: parse_timestamp(&row.updated_at),
        })
    }
}

impl ToolRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn select(
        &self,
        owner: &UserId,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<ToolRecord>, sqlx::Error> {
        let rows: Vec<ToolRow> = sqlx::query_as(
            "SELECT * FROM user_tool_data WHERE owner_id = ? AND tool_name = ? LIMIT ?",
        )
        .bind(owner.as_str())
        .bind(tool_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ToolRecord::try_from).collect()
    }

    /// Writes the record keyed by `(owner_id, tool_name)`, stamping
    /// `updated_at`. Returns the replaced row (if any) and the stored one.
    pub async fn upsert(
        &self,
        record: &ToolRecord,
    ) -> Result<(Option<ToolRecord>, ToolRecord), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<ToolRow> =
            sqlx::query_as("SELECT * FROM user_tool_data WHERE owner_id = ? AND tool_name = ?")
                .bind(record.owner_id.as_str())
                .bind(&record.tool_name)
                .fetch_optional(&mut *tx)
                .await?;

        let mut stored = record.clone();
        stored.updated_at = Utc::now();
        let data = serde_json::to_string(&stored.payload).map_err(|e| decode_error("data", e))?;

        sqlx::query(
            r#"
            INSERT INTO user_tool_data (owner_id, tool_name, data, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (owner_id, tool_name)
            DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(stored.owner_id.as_str())
        .bind(&stored.tool_name)
        .bind(&data)
        .bind(stored.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let previous = previous.map(ToolRecord::try_from).transpose()?;
        Ok((previous, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        repo: ToolRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            repo: ToolRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_select_missing_returns_empty() {
        let ctx = setup_repo().await;
        let rows = ctx
            .repo
            .select(&UserId::new("u1"), "sonar", 1)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_reports_previous() {
        let ctx = setup_repo().await;
        let owner = UserId::new("u1");

        let (previous, _) = ctx
            .repo
            .upsert(&ToolRecord::new(owner.clone(), "sonar", json!({"a": 1, "b": 2})))
            .await
            .unwrap();
        assert!(previous.is_none());

        let (previous, stored) = ctx
            .repo
            .upsert(&ToolRecord::new(owner.clone(), "sonar", json!({"c": 3})))
            .await
            .unwrap();
        assert_eq!(previous.unwrap().payload, json!({"a": 1, "b": 2}));
        assert_eq!(stored.payload, json!({"c": 3}));

        let rows = ctx.repo.select(&owner, "sonar", 5).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload, json!({"c": 3}));
    }

    #[tokio::test]
    async fn test_records_are_scoped_by_owner_and_tool() {
        let ctx = setup_repo().await;
        ctx.repo
            .upsert(&ToolRecord::new(UserId::new("u1"), "sonar", json!(1)))
            .await
            .unwrap();
        ctx.repo
            .upsert(&ToolRecord::new(UserId::new("u2"), "sonar", json!(2)))
            .await
            .unwrap();
        ctx.repo
            .upsert(&ToolRecord::new(UserId::new("u1"), "simulador", json!(3)))
            .await
            .unwrap();

        let rows = ctx
            .repo
            .select(&UserId::new("u1"), "sonar", 5)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload, json!(1));
    }
}
