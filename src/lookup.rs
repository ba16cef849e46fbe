use anyhow::Result;
use async_trait::async_trait;

use crate::{
    geo::{distance_meters, Coordinate},
    models::Merchant,
};

/// Places provider: points of interest around a coordinate.
#[async_trait]
pub trait MerchantLookup: Send + Sync {
    async fn lookup(&self, latitude: f64, longitude: f64, radius_meters: f64)
        -> Result<Vec<Merchant>>;

    fn name(&self) -> &'static str;
}

/// Fixed merchant list, filtered to the radius and sorted nearest first.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    merchants: Vec<Merchant>,
}

impl StaticLookup {
    pub fn new(merchants: Vec<Merchant>) -> Self {
        Self { merchants }
    }
}

#[async_trait]
impl MerchantLookup for StaticLookup {
    async fn lookup(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<Merchant>> {
        let center = Coordinate::new(latitude, longitude);
        let mut nearby: Vec<(f64, &Merchant)> = self
            .merchants
            .iter()
            .map(|merchant| (distance_meters(&center, &merchant.location), merchant))
            .filter(|(distance, _)| *distance <= radius_meters)
            .collect();
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(nearby.into_iter().map(|(_, m)| m.clone()).collect())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
