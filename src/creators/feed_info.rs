use async_trait::async_trait;
use tracing::debug;

use super::{Creator, CreatorKind};
use crate::config::{Configuration, FeedInfoConfig};
use crate::error::Result;
use crate::feed::{Feed, FeedInfo};
use crate::store::GeoDataStore;

/// Adds feed metadata when the configuration has a `feed_info` section.
pub struct FeedInfoCreator {
    info: Option<FeedInfoConfig>,
}

impl FeedInfoCreator {
    pub fn new(config: &Configuration) -> Self {
        Self {
            info: config.feed_info().cloned(),
        }
    }
}

#[async_trait]
impl Creator for FeedInfoCreator {
    fn kind(&self) -> CreatorKind {
        CreatorKind::FeedInfo
    }

    async fn populate(&self, feed: &mut Feed, _store: &mut GeoDataStore) -> Result<()> {
        let Some(info) = &self.info else {
            debug!("No feed_info configured");
            return Ok(());
        };

        feed.add_feed_info(FeedInfo {
            publisher_name: info.publisher_name.clone(),
            publisher_url: info.publisher_url.clone(),
            lang: info.lang.clone(),
            version: info.version.clone(),
            start_date: info.start_date,
            end_date: info.end_date,
            contact_email: info.contact_email.clone(),
        })
    }
}
