pub mod cache;
pub mod config;
pub mod creators;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod osm;
pub mod patch;
pub mod pipeline;
pub mod schedule;
pub mod store;

pub use error::{Error, Result};
