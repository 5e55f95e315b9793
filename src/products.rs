//! Product management for the ledger.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::{BackendError, DashboardStore};
use crate::models::{Product, UserId};
use crate::sync::{Notice, Notifier};

#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error("Please fill in the product name and ticket.")]
    MissingFields,
    #[error("Cannot delete: this product has entries in the daily ledger.")]
    HasMetrics,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// The signed-in user's products.
pub struct ProductCatalog {
    store: Arc<dyn DashboardStore>,
    notifier: Arc<dyn Notifier>,
    owner: UserId,
}

impl ProductCatalog {
    pub fn new(store: Arc<dyn DashboardStore>, notifier: Arc<dyn Notifier>, owner: UserId) -> Self {
        Self {
            store,
            notifier,
            owner,
        }
    }

    /// Products ordered by name.
    pub async fn list(&self) -> Result<Vec<Product>, ProductError> {
        self.store.list_products(&self.owner).await.map_err(|e| {
            tracing::error!("Failed to load products: {}", e);
            self.notifier.notify(Notice::error("Failed to load products."));
            e.into()
        })
    }

    pub async fn add(&self, name: &str, ticket: Option<f64>) -> Result<Product, ProductError> {
        let name = name.trim();
        let ticket = match ticket {
            Some(t) if !name.is_empty() && t.is_finite() => t,
            _ => {
                self.notifier
                    .notify(Notice::error(ProductError::MissingFields.to_string()));
                return Err(ProductError::MissingFields);
            }
        };

        match self
            .store
            .insert_product(&Product::new(self.owner.clone(), name, ticket))
            .await
        {
            Ok(product) => {
                self.notifier
                    .notify(Notice::success("Product added successfully!"));
                Ok(product)
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Error adding product: {}", e)));
                Err(e.into())
            }
        }
    }

    /// Deletes a product unless the ledger still references it.
    pub async fn delete(&self, id: Uuid) -> Result<(), ProductError> {
        let result = self.try_delete(id).await;
        match &result {
            Ok(()) => self
                .notifier
                .notify(Notice::success("Product deleted successfully!")),
            Err(ProductError::HasMetrics) => self
                .notifier
                .notify(Notice::error(ProductError::HasMetrics.to_string())),
            Err(e) => self
                .notifier
                .notify(Notice::error(format!("Error deleting product: {}", e))),
        }
        result
    }

    async fn try_delete(&self, id: Uuid) -> Result<(), ProductError> {
        if self.store.product_has_metrics(&self.owner, id).await? {
            return Err(ProductError::HasMetrics);
        }
        self.store.delete_product(&self.owner, id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::models::DailyMetric;
    use crate::sync::{NoticeLevel, RecordingNotifier};
    use chrono::NaiveDate;

    fn catalog() -> (ProductCatalog, Arc<MemoryBackend>, Arc<RecordingNotifier>) {
        let backend = Arc::new(MemoryBackend::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let catalog = ProductCatalog::new(backend.clone(), notifier.clone(), UserId::new("u1"));
        (catalog, backend, notifier)
    }

    #[tokio::test]
    async fn test_add_requires_name_and_ticket() {
        let (catalog, _, notifier) = catalog();

        assert!(matches!(
            catalog.add("   ", Some(10.0)).await,
            Err(ProductError::MissingFields)
        ));
        assert!(matches!(
            catalog.add("Course", None).await,
            Err(ProductError::MissingFields)
        ));
        assert_eq!(notifier.count(NoticeLevel::Error), 2);
        assert!(catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_name() {
        let (catalog, _, notifier) = catalog();
        catalog.add("Mentoring", Some(997.0)).await.unwrap();
        catalog.add(" Ebook ", Some(27.0)).await.unwrap();

        let names: Vec<String> = catalog
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Ebook", "Mentoring"]);
        assert_eq!(notifier.count(NoticeLevel::Success), 2);
    }

    #[tokio::test]
    async fn test_delete_refused_while_ledger_has_entries() {
        let (catalog, backend, _) = catalog();
        let product = catalog.add("Course", Some(197.0)).await.unwrap();

        let metric = DailyMetric::new(
            UserId::new("u1"),
            product.id,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        );
        backend.upsert_daily_metric(&metric).await.unwrap();

        assert!(matches!(
            catalog.delete(product.id).await,
            Err(ProductError::HasMetrics)
        ));
        assert_eq!(catalog.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_product() {
        let (catalog, _, _) = catalog();
        let product = catalog.add("Course", Some(197.0)).await.unwrap();

        catalog.delete(product.id).await.unwrap();
        assert!(catalog.list().await.unwrap().is_empty());
        assert!(matches!(
            catalog.delete(product.id).await,
            Err(ProductError::Backend(BackendError::NotFound(_)))
        ));
    }
}
