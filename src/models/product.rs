use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::user::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub owner_id: UserId,
    pub name: String,
    /// Average ticket (price) of the product.
    pub ticket: f64,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(owner_id: UserId, name: impl Into<String>, ticket: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            ticket,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ticket {:.2}) [{}]", self.name, self.ticket, self.id)
    }
}
