use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_error, parse_timestamp};
use crate::models::{DailyMetric, UserId};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct MetricRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MetricRow {
    owner_id: String,
    product_id: String,
    entry_date: String,
    investment: f64,
    revenue: f64,
    sales: Option<i64>,
    updated_at: String,
}

impl TryFrom<MetricRow> for DailyMetric {
    type Error = sqlx::Error;

    fn try_from(row: MetricRow) -> Result<Self, Self::Error> {
        Ok(DailyMetric {
            owner_id: UserId::new(row.owner_id),
            product_id: Uuid::parse_str(&row.product_id)
                .map_err(|e| decode_error("product_id", e))?,
            entry_date: NaiveDate::parse_from_str(&row.entry_date, DATE_FORMAT)
                .map_err(|e| decode_error("entry_date", e))?,
            investment: row.investment,
            revenue: row.revenue,
            sales: row.sales,
            updated_at: parse_timestamp(&row.updated_at),
        })
    }
}

impl MetricRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Entries of one product between `from` and `to`, inclusive, by date.
    pub async fn range(
        &self,
        owner: &UserId,
        product_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyMetric>, sqlx::Error> {
        let rows: Vec<MetricRow> = sqlx::query_as(
            r#"
            SELECT * FROM daily_metrics
            WHERE owner_id = ? AND product_id = ? AND entry_date >= ? AND entry_date <= ?
            ORDER BY entry_date
            "#,
        )
        .bind(owner.as_str())
        .bind(product_id.to_string())
        .bind(from.format(DATE_FORMAT).to_string())
        .bind(to.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DailyMetric::try_from).collect()
    }

    pub async fn upsert(&self, metric: &DailyMetric) -> Result<DailyMetric, sqlx::Error> {
        let mut stored = metric.clone();
        stored.updated_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO daily_metrics (owner_id, product_id, entry_date, investment, revenue, sales, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (owner_id, product_id, entry_date)
            DO UPDATE SET investment = excluded.investment, revenue = excluded.revenue,
                          sales = excluded.sales, updated_at = excluded.updated_at
            "#,
        )
        .bind(stored.owner_id.as_str())
        .bind(stored.product_id.to_string())
        .bind(stored.entry_date.format(DATE_FORMAT).to_string())
        .bind(stored.investment)
        .bind(stored.revenue)
        .bind(stored.sales)
        .bind(stored.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, ProductRepository};
    use crate::models::Product;
    use tempfile::TempDir;

    struct TestContext {
        repo: MetricRepository,
        product: Product,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let product = ProductRepository::new(pool.clone())
            .create(&Product::new(UserId::new("u1"), "Curso", 197.0))
            .await
            .unwrap();
        TestContext {
            repo: MetricRepository::new(pool),
            product,
            _temp_dir: temp_dir,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_same_day_overwrites() {
        let ctx = setup_repo().await;
        let owner = UserId::new("u1");

        let mut metric = DailyMetric::new(owner.clone(), ctx.product.id, day(3));
        metric.investment = 100.0;
        ctx.repo.upsert(&metric).await.unwrap();

        metric.revenue = 450.0;
        metric.sales = Some(3);
        ctx.repo.upsert(&metric).await.unwrap();

        let rows = ctx
            .repo
            .range(&owner, ctx.product.id, day(1), day(28))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].investment, 100.0);
        assert_eq!(rows[0].revenue, 450.0);
        assert_eq!(rows[0].sales, Some(3));
    }

    #[tokio::test]
    async fn test_range_bounds_are_inclusive() {
        let ctx = setup_repo().await;
        let owner = UserId::new("u1");

        for d in [1, 14, 28] {
            ctx.repo
                .upsert(&DailyMetric::new(owner.clone(), ctx.product.id, day(d)))
                .await
                .unwrap();
        }

        let rows = ctx
            .repo
            .range(&owner, ctx.product.id, day(1), day(14))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entry_date, day(1));
        assert_eq!(rows[1].entry_date, day(14));
    }
}
