//! Optional region choropleth
//!
//! Region outlines are static. Each configured region is fetched once and drawn with its
//! own fill and stroke colours; a region whose boundary cannot be fetched is left out.

use heatscape_core::errors::{HeatscapeError, HeatscapeResult};
use heatscape_core::geo::GeoCoordinate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collaborators::RegionBoundaryProvider;
use crate::heat_field::Rgba;

/// A region to draw and its colours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    pub fill: Rgba,
    pub stroke: Rgba,
}

/// Outline of a region as one or more closed rings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBoundary {
    pub name: String,
    pub polygons: Vec<Vec<GeoCoordinate>>,
}

impl RegionBoundary {
    /// Check that every ring has at least three valid vertices
    pub fn validate(&self) -> HeatscapeResult<()> {
        if self.polygons.is_empty() {
            return Err(HeatscapeError::DataError(format!(
                "Region {} has no polygons",
                self.name
            )));
        }
        for ring in &self.polygons {
            if ring.len() < 3 {
                return Err(HeatscapeError::DataError(format!(
                    "Region {} has a ring with {} vertices",
                    self.name,
                    ring.len()
                )));
            }
            if let Some(c) = ring.iter().find(|c| !c.is_valid()) {
                return Err(HeatscapeError::DataError(format!(
                    "Region {} has an invalid vertex ({}, {})",
                    self.name, c.lon, c.lat
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionFeature {
    pub spec: RegionSpec,
    pub boundary: RegionBoundary,
}

/// The regions that could be loaded, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChoroplethLayer {
    features: Vec<RegionFeature>,
    missing: Vec<String>,
}

impl ChoroplethLayer {
    /// Fetch the boundary of every region in `specs`
    ///
    /// Regions that fail to load are logged and omitted.
    pub async fn load(provider: &dyn RegionBoundaryProvider, specs: &[RegionSpec]) -> Self {
        let mut layer = Self::default();
        for spec in specs {
            let boundary = provider
                .boundary(&spec.name)
                .await
                .and_then(|boundary| boundary.validate().map(|_| boundary));
            match boundary {
                Ok(boundary) => layer.features.push(RegionFeature {
                    spec: spec.clone(),
                    boundary,
                }),
                Err(e) => {
                    warn!(region = %spec.name, error = %e, "Region boundary unavailable; omitting");
                    layer.missing.push(spec.name.clone());
                }
            }
        }
        info!(
            loaded = layer.features.len(),
            missing = layer.missing.len(),
            "Loaded region choropleth"
        );
        layer
    }

    pub fn features(&self) -> &[RegionFeature] {
        &self.features
    }

    pub fn get(&self, name: &str) -> Option<&RegionFeature> {
        self.features.iter().find(|f| f.spec.name == name)
    }

    /// Names of the regions that were omitted
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
