use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub id: String,
    pub name: String,
    /// Category label from the places provider, e.g. "dining" or "gas".
    /// Unknown labels are allowed and only take the generic scoring path.
    pub category: String,
    pub location: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_spend: Option<f64>,
}

impl Merchant {
    pub fn normalized_category(&self) -> String {
        self.category.trim().to_lowercase()
    }
}
