use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Card, Merchant};

/// A card recommendation for the merchant the user is dwelling at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub merchant: Merchant,
    pub recommended_card: Card,
    pub reason: String,
    pub estimated_earnings: String,
    /// Epoch milliseconds at generation time.
    pub timestamp: i64,
}

impl Notification {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}
