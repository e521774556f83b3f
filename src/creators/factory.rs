use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{
    AgencyCreator, CreatorSet, FeedInfoCreator, RouteNaming, RoutesCreator, ScheduleCreator,
    StopsCreator, TripsCreator,
};
use crate::config::{Configuration, DEFAULT_SELECTOR};
use crate::error::{Error, Result};

/// Builds the creators of one strategy from the run's configuration.
pub type StrategyConstructor = Box<dyn Fn(&Configuration) -> CreatorSet + Send + Sync>;

/// Maps selector keys to creator strategies.
///
/// Lookup is exact on the lowercased selector. There is no fallback: a
/// selector without a registered strategy is an error.
pub struct CreatorRegistry {
    strategies: BTreeMap<String, StrategyConstructor>,
}

impl CreatorRegistry {
    pub fn new() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// The built-in strategies: `default` and `accra`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_SELECTOR, |config| {
            standard_set(config, RouteNaming::Name)
        });
        registry.register("accra", |config| standard_set(config, RouteNaming::Termini));
        registry
    }

    /// Registers `constructor` under `key`, replacing any earlier strategy
    /// with the same key.
    pub fn register<F>(&mut self, key: &str, constructor: F) -> &mut Self
    where
        F: Fn(&Configuration) -> CreatorSet + Send + Sync + 'static,
    {
        self.strategies
            .insert(key.to_lowercase(), Box::new(constructor));
        self
    }

    /// Builds the creators for the configuration's selector.
    pub fn build(&self, config: &Configuration) -> Result<CreatorSet> {
        let selector = config.selector();
        let Some(constructor) = self.strategies.get(selector) else {
            let known: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
            warn!(selector, ?known, "No creator strategy for selector");
            return Err(Error::UnsupportedAgency(selector.to_string()));
        };
        debug!(selector, "Building creators");
        Ok(constructor(config))
    }
}

impl Default for CreatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn standard_set(config: &Configuration, naming: RouteNaming) -> CreatorSet {
    CreatorSet {
        agency: Box::new(AgencyCreator::new(config)),
        feed_info: Box::new(FeedInfoCreator::new(config)),
        routes: Box::new(RoutesCreator::new(config, naming)),
        stops: Box::new(StopsCreator::new(config)),
        schedule: Box::new(ScheduleCreator::new(config)),
        trips: Box::new(TripsCreator::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creators::CreatorKind;
    use crate::creators::test_support::{CONFIG, config, config_from};

    fn with_selector(selector: &str) -> Configuration {
        config_from(&CONFIG.replacen('{', &format!(r#"{{"selector": "{selector}","#), 1))
    }

    #[test]
    fn test_default_strategy_builds_all_kinds() {
        let set = CreatorRegistry::with_defaults().build(&config()).unwrap();
        let kinds: Vec<_> = set.in_order().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, CreatorKind::ORDER.to_vec());
    }

    #[test]
    fn test_selector_is_case_insensitive() {
        assert!(
            CreatorRegistry::with_defaults()
                .build(&with_selector("ACCRA"))
                .is_ok()
        );
    }

    #[test]
    fn test_unknown_selector_fails_closed() {
        let err = CreatorRegistry::with_defaults()
            .build(&with_selector("atlantis"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedAgency(ref s) if s == "atlantis"));
    }

    #[test]
    fn test_registered_strategy_is_used() {
        let mut registry = CreatorRegistry::new();
        registry.register("Atlantis", |config| standard_set(config, RouteNaming::Termini));

        assert!(registry.build(&with_selector("atlantis")).is_ok());
        assert!(registry.build(&with_selector("ATLANTIS")).is_ok());
        assert!(registry.build(&config()).is_err());
    }
}
