use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;

/// One day of the ledger for one product.
///
/// Unique per `(owner_id, product_id, entry_date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub owner_id: UserId,
    pub product_id: Uuid,
    pub entry_date: NaiveDate,
    pub investment: f64,
    pub revenue: f64,
    pub sales: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl DailyMetric {
    pub fn new(owner_id: UserId, product_id: Uuid, entry_date: NaiveDate) -> Self {
        Self {
            owner_id,
            product_id,
            entry_date,
            investment: 0.0,
            revenue: 0.0,
            sales: None,
            updated_at: Utc::now(),
        }
    }
}
