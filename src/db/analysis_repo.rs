use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_error, parse_timestamp};
use crate::models::{AnalysisSummary, SavedAnalysis, UserId};

pub struct AnalysisRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    owner_id: String,
    title: String,
    campaign_data: String,
    analysis_result: String,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    title: String,
    created_at: String,
}

impl TryFrom<AnalysisRow> for SavedAnalysis {
    type Error = sqlx::Error;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        Ok(SavedAnalysis {
            id: Uuid::parse_str(&row.id).map_err(|e| decode_error("id", e))?,
            owner_id: UserId::new(row.owner_id),
            title: row.title,
            campaign_data: row.campaign_data,
            analysis_result: row.analysis_result,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

impl AnalysisRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, analysis: &SavedAnalysis) -> Result<SavedAnalysis, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO ia_analyses (id, owner_id, title, campaign_data, analysis_result, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(analysis.id.to_string())
        .bind(analysis.owner_id.as_str())
        .bind(&analysis.title)
        .bind(&analysis.campaign_data)
        .bind(&analysis.analysis_result)
        .bind(analysis.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_by_id(&analysis.owner_id, analysis.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(
        &self,
        owner: &UserId,
        id: Uuid,
    ) -> Result<Option<SavedAnalysis>, sqlx::Error> {
        let row: Option<AnalysisRow> =
            sqlx::query_as("SELECT * FROM ia_analyses WHERE id = ? AND owner_id = ?")
                .bind(id.to_string())
                .bind(owner.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(SavedAnalysis::try_from).transpose()
    }

    /// History, newest first.
    pub async fn list(&self, owner: &UserId) -> Result<Vec<AnalysisSummary>, sqlx::Error> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT id, title, created_at FROM ia_analyses WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AnalysisSummary {
                    id: Uuid::parse_str(&row.id).map_err(|e| decode_error("id", e))?,
                    title: row.title,
                    created_at: parse_timestamp(&row.created_at),
                })
            })
            .collect()
    }

    pub async fn delete(&self, owner: &UserId, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM ia_analyses WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
