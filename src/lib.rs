//! Live rail tracking core.
//!
//! Feed a [`tracker::Tracker`] batches of position [`tracker::Report`]s and it
//! maintains which segment every active train occupies, how far along it is,
//! whether it is running late, and rolling arrival statistics per station.
//! Static system data comes from a [`feed::Feed`] bundle, historical
//! percentile series from a [`stats::SeriesProvider`]. Projection, rendering
//! and the aggregation pipeline itself live downstream of this crate.

pub mod feed;
pub mod identity;
pub mod shared;
pub mod stats;
pub mod topology;
pub mod tracker;

pub use tracker::{Report, Tracker, TrackerConfig};
