use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_error, parse_timestamp};
use crate::models::{Product, UserId};

pub struct ProductRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    owner_id: String,
    name: String,
    ticket: f64,
    created_at: String,
}

impl TryFrom<ProductRow> for Product {
    type Error = sqlx::Error;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: Uuid::parse_str(&row.id).map_err(|e| decode_error("id", e))?,
            owner_id: UserId::new(row.owner_id),
            name: row.name,
            ticket: row.ticket,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, product: &Product) -> Result<Product, sqlx::Error> {
        sqlx::query(
            "INSERT INTO products (id, owner_id, name, ticket, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(product.id.to_string())
        .bind(product.owner_id.as_str())
        .bind(&product.name)
        .bind(product.ticket)
        .bind(product.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_by_id(&product.owner_id, product.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(&self, owner: &UserId, id: Uuid) -> Result<Option<Product>, sqlx::Error> {
        let row: Option<ProductRow> =
            sqlx::query_as("SELECT * FROM products WHERE id = ? AND owner_id = ?")
                .bind(id.to_string())
                .bind(owner.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Product::try_from).transpose()
    }

    pub async fn list(&self, owner: &UserId) -> Result<Vec<Product>, sqlx::Error> {
        let rows: Vec<ProductRow> =
            sqlx::query_as("SELECT * FROM products WHERE owner_id = ? ORDER BY name")
                .bind(owner.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Returns false when no row matched.
    pub async fn delete(&self, owner: &UserId, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn has_metrics(&self, owner: &UserId, id: Uuid) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM daily_metrics WHERE owner_id = ? AND product_id = ? LIMIT 1",
        )
        .bind(owner.as_str())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    struct TestContext {
        repo: ProductRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            repo: ProductRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_and_list_sorted_by_name() {
        let ctx = setup_repo().await;
        let owner = UserId::new("u1");

        ctx.repo
            .create(&Product::new(owner.clone(), "Mentoria", 997.0))
            .await
            .unwrap();
        ctx.repo
            .create(&Product::new(owner.clone(), "Curso", 197.0))
            .await
            .unwrap();
        ctx.repo
            .create(&Product::new(UserId::new("u2"), "Outro", 1.0))
            .await
            .unwrap();

        let products = ctx.repo.list(&owner).await.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Curso");
        assert_eq!(products[1].name, "Mentoria");
    }

    #[tokio::test]
    async fn test_delete_only_own_product() {
        let ctx = setup_repo().await;
        let product = ctx
            .repo
            .create(&Product::new(UserId::new("u1"), "Curso", 197.0))
            .await
            .unwrap();

        assert!(!ctx
            .repo
            .delete(&UserId::new("intruder"), product.id)
            .await
            .unwrap());
        assert!(ctx
            .repo
            .delete(&UserId::new("u1"), product.id)
            .await
            .unwrap());
        assert!(ctx
            .repo
            .get_by_id(&UserId::new("u1"), product.id)
            .await
            .unwrap()
            .is_none());
    }
}
