use anyhow::Result;
use async_trait::async_trait;

/// Availability-zone lookup for a region.
#[async_trait]
pub trait Zones: Send + Sync {
    async fn get(&self, region: &str) -> Result<Vec<String>>;
}

/// Derives the standard `-a`/`-b`/`-c` zone names from the region.
///
/// TODO: replace with a compute API lookup once the authenticated cloud
/// client grows a zones call; the derived names hold for every current
/// GCP region but are not guaranteed by the platform.
pub struct RegionZones;

#[async_trait]
impl Zones for RegionZones {
    async fn get(&self, region: &str) -> Result<Vec<String>> {
        Ok(["a", "b", "c"]
            .iter()
            .map(|suffix| format!("{region}-{suffix}"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn derives_three_zones_from_region() {
        let zones = RegionZones.get("us-west1").await.unwrap();
        assert_eq!(zones, vec!["us-west1-a", "us-west1-b", "us-west1-c"]);
    }
}
