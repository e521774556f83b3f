use async_trait::async_trait;
use tracing::{debug, info};

use super::{Creator, CreatorKind, tolerate};
use crate::config::{Configuration, TransformPolicy};
use crate::error::{Error, Result};
use crate::feed::{Feed, Route};
use crate::osm::GeoRoute;
use crate::store::GeoDataStore;

/// How `route_long_name` is derived from a route relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteNaming {
    /// The relation's `name` tag.
    Name,
    /// `"<from> - <to>"` from the relation's termini, or the `name` tag when
    /// either is missing.
    Termini,
}

/// Adds one route per route relation.
pub struct RoutesCreator {
    agency_id: String,
    route_type: u16,
    naming: RouteNaming,
    policy: TransformPolicy,
}

impl RoutesCreator {
    pub fn new(config: &Configuration, naming: RouteNaming) -> Self {
        Self {
            agency_id: config.agency().agency_id.clone(),
            route_type: config.route_type(),
            naming,
            policy: config.transform_policy(),
        }
    }

    fn long_name(&self, route: &GeoRoute) -> String {
        match (self.naming, &route.from, &route.to) {
            (RouteNaming::Termini, Some(from), Some(to)) => format!("{from} - {to}"),
            _ => route.name.clone(),
        }
    }

    fn to_record(&self, route: &GeoRoute) -> Result<Route> {
        let entity = || format!("route {}", route.id);

        if route.stop_ids.len() < 2 {
            return Err(Error::transform(
                entity(),
                format!("has {} stop(s), at least two are needed", route.stop_ids.len()),
            ));
        }

        let long_name = self.long_name(route);
        if route.reference.trim().is_empty() && long_name.trim().is_empty() {
            return Err(Error::transform(entity(), "has neither a ref nor a name"));
        }

        Ok(Route {
            route_id: route.id.clone(),
            agency_id: self.agency_id.clone(),
            route_short_name: route.reference.trim().to_string(),
            route_long_name: long_name.trim().to_string(),
            route_type: self.route_type,
            route_color: route.colour.as_deref().and_then(|c| {
                let color = normalize_colour(c);
                if color.is_none() {
                    debug!(route = %route.id, colour = c, "Ignoring colour tag");
                }
                color
            }),
        })
    }
}

/// `#a1b2c3` or `A1B2C3` to `A1B2C3`. Named colours are not mapped.
fn normalize_colour(tag: &str) -> Option<String> {
    let hex = tag.trim().trim_start_matches('#');
    (hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit())).then(|| hex.to_ascii_uppercase())
}

#[async_trait]
impl Creator for RoutesCreator {
    fn kind(&self) -> CreatorKind {
        CreatorKind::Routes
    }

    async fn populate(&self, feed: &mut Feed, store: &mut GeoDataStore) -> Result<()> {
        let routes = store.get_routes(false).await?;

        let mut added = 0;
        for route in routes.iter() {
            let result = self.to_record(route).and_then(|r| feed.add_route(r));
            if tolerate(self.policy, result)?.is_some() {
                added += 1;
            }
        }

        info!(added, skipped = routes.len() - added, "Routes added");
        Ok(())
    }
}
