use std::{collections::HashMap, sync::Arc};

use crate::{shared::time::Timestamp, stats::HourlySeries};

use super::Error;

/// Progress past this fraction holds at [`CLAMPED_FRACTION`] so a marker
/// never overruns its destination while the next report is pending.
const CLAMP_THRESHOLD: f64 = 0.95;
const CLAMPED_FRACTION: f64 = 0.98;

/// A train currently traversing a segment, as the segment registry sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTrain {
    pub started_at: Timestamp,
    pub estimated_arrival: Timestamp,
    pub is_late: bool,
}

/// Scalar interpolation result. Mapping the fraction onto geometry is the
/// projection layer's job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub fraction: f64,
    pub is_late: bool,
}

/// One directed edge of the live network, tracking the trains traversing
/// it. Created eagerly for statically known edges and lazily for edges
/// first seen in live data; never destroyed.
#[derive(Debug, Clone, Default)]
pub struct RouteSegment {
    pub origin: Arc<str>,
    pub destination: Arc<str>,
    /// Historical traversal durations in seconds, by hour of day.
    stats: HourlySeries,
    active: HashMap<Arc<str>, ActiveTrain>,
    /// Worst lateness among trains on this segment, refreshed by evolve.
    pub max_late_minutes: f64,
}

impl RouteSegment {
    pub fn new(origin: Arc<str>, destination: Arc<str>, stats: HourlySeries) -> Self {
        Self {
            origin,
            destination,
            stats,
            active: HashMap::new(),
            max_late_minutes: 0.0,
        }
    }

    /// Historical median traversal time in seconds for the given hour;
    /// 0.0 when no history exists.
    pub fn median_duration(&self, hour: u32) -> f64 {
        self.stats.median(hour)
    }

    /// Registers a train on this segment.
    ///
    /// A start time past the scheduled arrival is inconsistent input; the
    /// arrival estimate is rebuilt from the hour's median and the train
    /// starts out late.
    pub fn add_train(&mut self, trip_id: Arc<str>, started_at: Timestamp, arrival: Timestamp) {
        let mut is_late = false;
        let mut estimated_arrival = arrival;
        if started_at > arrival {
            estimated_arrival = started_at + self.median_duration(arrival.hour()).round() as i64;
            is_late = true;
        }
        self.active.insert(
            trip_id,
            ActiveTrain {
                started_at,
                estimated_arrival,
                is_late,
            },
        );
    }

    /// Interpolated progress of a registered train at `now`.
    ///
    /// The fraction is clamped at [`CLAMPED_FRACTION`] once it passes
    /// [`CLAMP_THRESHOLD`], and that clamp also forces the late flag. A
    /// zero or negative estimated duration yields a neutral fraction of
    /// 0.0 instead of failing.
    pub fn position(&mut self, trip_id: &str, now: Timestamp) -> Result<Progress, Error> {
        let Some(entry) = self.active.get_mut(trip_id) else {
            return Err(self.missing(trip_id));
        };
        let total = entry.estimated_arrival.seconds_since(entry.started_at);
        if total <= 0 {
            return Ok(Progress {
                fraction: 0.0,
                is_late: entry.is_late,
            });
        }
        let elapsed = now.seconds_since(entry.started_at) as f64;
        let mut fraction = (elapsed / total as f64).max(0.0);
        if fraction > CLAMP_THRESHOLD {
            fraction = CLAMPED_FRACTION;
            entry.is_late = true;
        }
        Ok(Progress {
            fraction,
            is_late: entry.is_late,
        })
    }

    /// Deregisters a train. The id must be registered here: the train and
    /// segment registries mirror each other, so a miss means that
    /// invariant broke and the operation has to abort.
    pub fn clear_train(&mut self, trip_id: &str) -> Result<ActiveTrain, Error> {
        self.active.remove(trip_id).ok_or_else(|| self.missing(trip_id))
    }

    pub fn active_trains(&self) -> &HashMap<Arc<str>, ActiveTrain> {
        &self.active
    }

    pub fn trip_ids(&self) -> impl Iterator<Item = &Arc<str>> {
        self.active.keys()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn missing(&self, trip_id: &str) -> Error {
        Error::TrainNotOnSegment {
            trip: trip_id.to_string(),
            origin: self.origin.clone(),
            destination: self.destination.clone(),
        }
    }
}
