use async_trait::async_trait;
use tracing::debug;

use super::{Creator, CreatorKind};
use crate::config::{AgencyConfig, Configuration};
use crate::error::Result;
use crate::feed::{Agency, Feed};
use crate::store::GeoDataStore;

/// Adds the configured agency.
pub struct AgencyCreator {
    agency: AgencyConfig,
}

impl AgencyCreator {
    pub fn new(config: &Configuration) -> Self {
        Self {
            agency: config.agency().clone(),
        }
    }
}

#[async_trait]
impl Creator for AgencyCreator {
    fn kind(&self) -> CreatorKind {
        CreatorKind::Agency
    }

    async fn populate(&self, feed: &mut Feed, _store: &mut GeoDataStore) -> Result<()> {
        let a = &self.agency;
        feed.add_agency(Agency {
            agency_id: a.agency_id.clone(),
            agency_name: a.agency_name.clone(),
            agency_url: a.agency_url.clone(),
            agency_timezone: a.agency_timezone.clone(),
            agency_lang: a.agency_lang.clone(),
            agency_phone: a.agency_phone.clone(),
            agency_fare_url: a.agency_fare_url.clone(),
        })?;
        debug!(agency_id = %a.agency_id, "Agency added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creators::test_support::{config, empty_store};

    #[tokio::test]
    async fn test_adds_configured_agency() {
        let mut feed = Feed::new();
        let mut store = empty_store();

        AgencyCreator::new(&config())
            .populate(&mut feed, &mut store.store)
            .await
            .unwrap();

        assert_eq!(feed.agencies().len(), 1);
        let agency = feed.agency("TRT").unwrap();
        assert_eq!(agency.agency_name, "Trotro Network");
        assert_eq!(agency.agency_timezone, "Africa/Accra");
    }
}
