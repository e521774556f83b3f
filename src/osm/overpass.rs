//! Overpass API client.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{BoundingBox, Configuration, QueryConfig};
use crate::fetch::{BasicClient, HttpClient, fetch_with_query};

use super::{GeoRoute, GeoSource, GeoStop};

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<Element>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Relation {
        id: i64,
        #[serde(default)]
        members: Vec<Member>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Member {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "ref")]
    reference: i64,
    #[serde(default)]
    role: String,
}

/// Fetches route relations and their stop nodes from an Overpass endpoint.
pub struct OverpassSource<C = BasicClient> {
    client: C,
    url: String,
    bbox: BoundingBox,
    tags: BTreeMap<String, String>,
    timeout_secs: u64,
}

impl OverpassSource<BasicClient> {
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let client = BasicClient::with_timeout(config.timeout())?;
        Ok(Self::new(
            client,
            config.overpass_url(),
            config.query(),
            config.timeout().as_secs(),
        ))
    }
}

impl<C: HttpClient> OverpassSource<C> {
    pub fn new(client: C, url: &str, query: &QueryConfig, timeout_secs: u64) -> Self {
        Self {
            client,
            url: url.to_string(),
            bbox: query.bbox,
            tags: query.tags.clone(),
            timeout_secs,
        }
    }

    fn route_selector(&self) -> String {
        let mut selector = String::from("relation[\"type\"=\"route\"]");
        for (key, value) in &self.tags {
            selector.push_str(&format!("[\"{key}\"=\"{value}\"]"));
        }
        let b = self.bbox;
        selector.push_str(&format!("({},{},{},{})", b.s, b.w, b.n, b.e));
        selector
    }

    pub fn routes_query(&self) -> String {
        format!(
            "[out:json][timeout:{}];\n({};);\nout body;",
            self.timeout_secs,
            self.route_selector()
        )
    }

    /// Direct node members of the matching routes: their stops and platforms.
    pub fn stops_query(&self) -> String {
        format!(
            "[out:json][timeout:{}];\n({};)->.routes;\nnode(r.routes);\nout body;",
            self.timeout_secs,
            self.route_selector()
        )
    }

    async fn run(&self, query: &str) -> Result<OverpassResponse> {
        let body = fetch_with_query(&self.client, &self.url, &[("data", query)])
            .await
            .with_context(|| format!("Overpass request to {} failed", self.url))?;
        serde_json::from_slice(&body).context("Overpass response is not valid JSON")
    }
}

#[async_trait]
impl<C: HttpClient> GeoSource for OverpassSource<C> {
    fn name(&self) -> &str {
        "overpass"
    }

    fn cache_key(&self) -> String {
        self.routes_query()
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch_routes(&self) -> Result<Vec<GeoRoute>> {
        let response = self.run(&self.routes_query()).await?;
        let routes = routes_from_elements(response.elements);
        info!(count = routes.len(), "Fetched route relations");
        Ok(routes)
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch_stops(&self) -> Result<Vec<GeoStop>> {
        let response = self.run(&self.stops_query()).await?;
        let stops = stops_from_elements(response.elements);
        info!(count = stops.len(), "Fetched stop nodes");
        Ok(stops)
    }
}

/// Builds routes from relation elements, sorted by relation id.
fn routes_from_elements(elements: Vec<Element>) -> Vec<GeoRoute> {
    let mut relations: Vec<(i64, GeoRoute)> = elements
        .into_iter()
        .filter_map(|element| match element {
            Element::Relation { id, members, tags } => Some((id, route_from_relation(id, &members, tags))),
            _ => None,
        })
        .collect();
    relations.sort_by_key(|(id, _)| *id);
    relations.into_iter().map(|(_, route)| route).collect()
}

fn route_from_relation(id: i64, members: &[Member], mut tags: BTreeMap<String, String>) -> GeoRoute {
    let with_role = |prefix: &str| -> Vec<String> {
        members
            .iter()
            .filter(|m| m.kind == "node" && m.role.starts_with(prefix))
            .map(|m| format!("n{}", m.reference))
            .collect()
    };

    // Mapped stop positions describe the path best; fall back to platforms.
    let mut stop_ids = with_role("stop");
    if stop_ids.is_empty() {
        stop_ids = with_role("platform");
    }
    stop_ids.dedup();

    if stop_ids.is_empty() {
        debug!(relation = id, "Route relation has no stop members");
    }

    GeoRoute {
        id: format!("r{id}"),
        reference: tags.remove("ref").unwrap_or_default(),
        name: tags.remove("name").unwrap_or_default(),
        stop_ids,
        from: tags.remove("from"),
        to: tags.remove("to"),
        colour: tags.remove("colour"),
    }
}

/// Builds stops from node elements, sorted by node id.
fn stops_from_elements(elements: Vec<Element>) -> Vec<GeoStop> {
    let mut nodes: Vec<(i64, GeoStop)> = elements
        .into_iter()
        .filter_map(|element| match element {
            Element::Node { id, lat, lon, mut tags } => Some((
                id,
                GeoStop {
                    id: format!("n{id}"),
                    lat,
                    lon,
                    name: tags.remove("name").unwrap_or_default(),
                },
            )),
            _ => None,
        })
        .collect();
    nodes.sort_by_key(|(id, _)| *id);
    nodes.dedup_by_key(|(id, _)| *id);
    nodes.into_iter().map(|(_, stop)| stop).collect()
}
