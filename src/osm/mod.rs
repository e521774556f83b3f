//! OpenStreetMap transit entities and the sources that provide them.

mod overpass;

pub use overpass::OverpassSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A route relation: the ordered stops a line serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRoute {
    /// `r<relation id>`
    pub id: String,
    /// The `ref` tag, e.g. `"12"`; empty when untagged.
    #[serde(rename = "ref")]
    pub reference: String,
    pub name: String,
    /// Stop node identifiers in travel order.
    pub stop_ids: Vec<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub colour: Option<String>,
}

/// A stop or platform node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoStop {
    /// `n<node id>`
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// The `name` tag; empty when untagged.
    pub name: String,
}

/// Provider of geographic transit data.
#[async_trait]
pub trait GeoSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Identifies the query this source answers. Cache entries written for a
    /// different key are ignored.
    fn cache_key(&self) -> String;

    async fn fetch_routes(&self) -> anyhow::Result<Vec<GeoRoute>>;

    async fn fetch_stops(&self) -> anyhow::Result<Vec<GeoStop>>;
}
