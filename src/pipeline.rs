//! One conversion run, from loaded configuration to patched archive.
//!
//! ```text
//! Unconfigured -> Configured -> DataLoaded -> FeedPopulated -> Validated -> Written -> Patched
//! ```
//!
//! A single-source refresh stops in `DataLoaded` once the cache is updated.
//! Any error ends the run in the state it was in; nothing is written before
//! validation passes.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::config::Configuration;
use crate::creators::{CreatorKind, CreatorRegistry};
use crate::error::{Error, Result};
use crate::feed::{Feed, Problem};
use crate::patch::{self, PatchOutcome};
use crate::store::GeoDataStore;

/// Which cached data to re-fetch before converting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshScope {
    /// Use cached data where available.
    #[default]
    None,
    Routes,
    Stops,
    ScheduleSource,
    /// Routes, stops and schedule source; the conversion then proceeds.
    All,
}

impl RefreshScope {
    /// Whether the run ends after refreshing.
    pub fn is_single_source(self) -> bool {
        matches!(
            self,
            RefreshScope::Routes | RefreshScope::Stops | RefreshScope::ScheduleSource
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unconfigured,
    Configured,
    DataLoaded,
    FeedPopulated,
    Validated,
    Written,
    Patched,
}

/// What a successful run did.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: PipelineState,
    /// Non-fatal validation problems.
    pub problems: Vec<Problem>,
    /// Creators in the order they populated the feed.
    pub populated: Vec<CreatorKind>,
    pub archive: Option<PathBuf>,
    pub patch: Option<PatchOutcome>,
}

impl RunOutcome {
    fn new(state: PipelineState) -> Self {
        Self {
            state,
            problems: Vec::new(),
            populated: Vec::new(),
            archive: None,
            patch: None,
        }
    }
}

async fn refresh(store: &mut GeoDataStore, scope: RefreshScope) -> Result<()> {
    match scope {
        RefreshScope::None => {}
        RefreshScope::Routes => {
            store.get_routes(true).await?;
        }
        RefreshScope::Stops => {
            store.get_stops(true).await?;
        }
        RefreshScope::ScheduleSource => {
            store.get_schedule_source(true).await?;
        }
        RefreshScope::All => {
            store.get_routes(true).await?;
            store.get_stops(true).await?;
            store.get_schedule_source(true).await?;
        }
    }
    Ok(())
}

/// Runs the conversion for `config`.
#[tracing::instrument(skip_all, fields(selector = config.selector(), scope = ?scope))]
pub async fn run(
    config: &Configuration,
    store: &mut GeoDataStore,
    registry: &CreatorRegistry,
    scope: RefreshScope,
) -> Result<RunOutcome> {
    refresh(store, scope).await?;
    if scope.is_single_source() {
        info!("Cache refreshed");
        return Ok(RunOutcome::new(PipelineState::DataLoaded));
    }

    let creators = registry.build(config)?;

    let mut feed = Feed::new();
    let mut outcome = RunOutcome::new(PipelineState::DataLoaded);
    for creator in creators.in_order() {
        creator.populate(&mut feed, store).await?;
        outcome.populated.push(creator.kind());
    }
    outcome.state = PipelineState::FeedPopulated;

    let (fatal, warnings): (Vec<_>, Vec<_>) =
        feed.validate().into_iter().partition(Problem::is_fatal);
    for problem in &warnings {
        warn!(%problem, "Validation warning");
    }
    for problem in &fatal {
        error!(%problem, "Validation error");
    }
    if let Some(first) = fatal.first() {
        return Err(Error::Validation {
            fatal: fatal.len(),
            first: first.to_string(),
        });
    }
    outcome.problems = warnings;
    outcome.state = PipelineState::Validated;

    let path = config.output_file();
    feed.write(path)?;
    outcome.archive = Some(path.to_path_buf());
    outcome.state = PipelineState::Written;

    outcome.patch = Some(patch::patch(&feed, path)?);
    outcome.state = PipelineState::Patched;

    info!(
        path = %path.display(),
        warnings = outcome.problems.len(),
        "Feed complete"
    );
    Ok(outcome)
}
