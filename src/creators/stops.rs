use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::info;

use super::{Creator, CreatorKind, tolerate};
use crate::config::{Configuration, TransformPolicy};
use crate::error::{Error, Result};
use crate::feed::{Feed, Stop};
use crate::osm::{GeoRoute, GeoStop};
use crate::store::GeoDataStore;

/// Adds the stops served by the routes in the feed, in order of first use.
pub struct StopsCreator {
    unnamed_stop_name: Option<String>,
    policy: TransformPolicy,
}

impl StopsCreator {
    pub fn new(config: &Configuration) -> Self {
        Self {
            unnamed_stop_name: config.unnamed_stop_name().map(str::to_string),
            policy: config.transform_policy(),
        }
    }

    fn to_record(&self, stop: &GeoStop) -> Result<Stop> {
        let name = match stop.name.trim() {
            "" => self.unnamed_stop_name.clone().ok_or_else(|| {
                Error::transform(format!("stop {}", stop.id), "has no name")
            })?,
            name => name.to_string(),
        };
        Ok(Stop {
            stop_id: stop.id.clone(),
            stop_name: name,
            stop_lat: stop.lat,
            stop_lon: stop.lon,
        })
    }
}

#[async_trait]
impl Creator for StopsCreator {
    fn kind(&self) -> CreatorKind {
        CreatorKind::Stops
    }

    async fn populate(&self, feed: &mut Feed, store: &mut GeoDataStore) -> Result<()> {
        let routes = store.get_routes(false).await?;
        let stops = store.get_stops(false).await?;

        let by_id: HashMap<&str, &GeoStop> = stops.iter().map(|s| (s.id.as_str(), s)).collect();
        let in_feed: Vec<&GeoRoute> = routes
            .iter()
            .filter(|r| feed.route(&r.id).is_some())
            .collect();

        let mut seen = HashSet::new();
        let mut added = 0;
        for route in in_feed {
            for stop_id in &route.stop_ids {
                if !seen.insert(stop_id.as_str()) {
                    continue;
                }
                let result = match by_id.get(stop_id.as_str()) {
                    Some(stop) => self.to_record(stop).and_then(|s| feed.add_stop(s)),
                    None => Err(Error::transform(
                        format!("route {}", route.id),
                        format!("stop {stop_id} is missing from the stop data"),
                    )),
                };
                if tolerate(self.policy, result)?.is_some() {
                    added += 1;
                }
            }
        }

        info!(added, available = stops.len(), "Stops added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creators::test_support::{CONFIG, config, config_from, route, stop, store};
    use crate::feed::Route;
    use crate::schedule::ScheduleData;

    fn feed_with_routes(ids: &[&str]) -> Feed {
        let mut feed = Feed::new();
        for id in ids {
            feed.add_route(Route {
                route_id: id.to_string(),
                agency_id: "TRT".into(),
                route_short_name: id.to_string(),
                route_long_name: String::new(),
                route_type: 3,
                route_color: None,
            })
            .unwrap();
        }
        feed
    }

    #[tokio::test]
    async fn test_stops_in_first_use_order() {
        let mut feed = feed_with_routes(&["r1", "r2"]);
        let mut store = store(
            vec![route("r1", "1", &["n3", "n1"]), route("r2", "2", &["n1", "n2"])],
            vec![stop("n1", "Circle"), stop("n2", "Madina"), stop("n3", "Kaneshie")],
            ScheduleData::default(),
        );

        StopsCreator::new(&config())
            .populate(&mut feed, &mut store.store)
            .await
            .unwrap();

        let ids: Vec<_> = feed.stops().iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n1", "n2"]);
    }

    #[tokio::test]
    async fn test_only_stops_of_routes_in_feed() {
        let mut feed = feed_with_routes(&["r1"]);
        let mut store = store(
            vec![route("r1", "1", &["n1", "n2"]), route("r2", "2", &["n3", "n4"])],
            vec![stop("n1", "A"), stop("n2", "B"), stop("n3", "C"), stop("n4", "D")],
            ScheduleData::default(),
        );

        StopsCreator::new(&config())
            .populate(&mut feed, &mut store.store)
            .await
            .unwrap();

        assert_eq!(feed.stops().len(), 2);
        assert!(feed.stop("n3").is_none());
    }

    #[tokio::test]
    async fn test_missing_stop_names_route() {
        let mut feed = feed_with_routes(&["r1"]);
        let mut store = store(
            vec![route("r1", "1", &["n1", "n404"])],
            vec![stop("n1", "A")],
            ScheduleData::default(),
        );

        let err = StopsCreator::new(&config())
            .populate(&mut feed, &mut store.store)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transform { ref entity, .. } if entity == "route r1"));
        assert!(err.to_string().contains("n404"));
    }

    #[tokio::test]
    async fn test_unnamed_stop_uses_configured_name() {
        let json = CONFIG.replacen('{', r#"{"stops": {"unnamed_stop_name": "Stop"},"#, 1);
        let mut feed = feed_with_routes(&["r1"]);
        let mut store = store(
            vec![route("r1", "1", &["n1", "n2"])],
            vec![stop("n1", "A"), stop("n2", " ")],
            ScheduleData::default(),
        );

        StopsCreator::new(&config_from(&json))
            .populate(&mut feed, &mut store.store)
            .await
            .unwrap();

        assert_eq!(feed.stop("n2").unwrap().stop_name, "Stop");
    }

    #[tokio::test]
    async fn test_unnamed_stop_without_default_is_error() {
        let mut feed = feed_with_routes(&["r1"]);
        let mut store = store(
            vec![route("r1", "1", &["n1", "n2"])],
            vec![stop("n1", "A"), stop("n2", "")],
            ScheduleData::default(),
        );

        let err = StopsCreator::new(&config())
            .populate(&mut feed, &mut store.store)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transform { ref entity, .. } if entity == "stop n2"));
    }
}
