use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use tracing::warn;

use crate::{
    identity::Service,
    shared::{geo::Coordinate, time::Timestamp},
    stats::HourlySeries,
};

use super::{SegmentKey, segment::ActiveTrain};

/// How many arrival timestamps each (line, direction) history retains.
const RECENT_ARRIVALS: usize = 3;

/// A train expected at this stop, read off a feeder segment by evolve.
#[derive(Debug, Clone)]
pub struct UpcomingArrival {
    pub trip_id: Arc<str>,
    pub service: Service,
    pub estimated_arrival: Timestamp,
}

/// One physical station. Tracks a bounded arrival history per service,
/// the rolling headway derived from it, and a read-only link to the
/// segment feeding it per service. Created once at startup, never
/// destroyed.
#[derive(Debug, Clone, Default)]
pub struct StopState {
    pub id: Arc<str>,
    pub name: Arc<str>,
    pub location: Coordinate,
    /// Key of the upstream segment per service. A key, not a reference:
    /// the segment registry stays the single owner of live-train state.
    feeders: HashMap<Service, SegmentKey>,
    recent_arrivals: HashMap<Service, VecDeque<Timestamp>>,
    headway_minutes: HashMap<Service, f64>,
    /// Historical minutes between arrivals, by service and hour.
    frequency: HashMap<Service, HourlySeries>,
    /// Historical trip minutes to reach this stop, by service and hour.
    trip_duration: HashMap<Service, HourlySeries>,
    upcoming: Vec<UpcomingArrival>,
    /// Accumulated seconds of lateness among approaching trains,
    /// refreshed by evolve.
    pub approaching_late_seconds: f64,
}

impl StopState {
    pub fn new(
        id: Arc<str>,
        name: Arc<str>,
        location: Coordinate,
        frequency: HashMap<Service, HourlySeries>,
        trip_duration: HashMap<Service, HourlySeries>,
    ) -> Self {
        Self {
            id,
            name,
            location,
            frequency,
            trip_duration,
            ..Default::default()
        }
    }

    /// Links this stop to the live-train view of the segment feeding it
    /// for one service, seeding the arrival history with the current time.
    pub fn associate_route(&mut self, service: Service, feeder: SegmentKey, now: Timestamp) {
        self.feeders.insert(service, feeder);
        let mut seeded = VecDeque::with_capacity(RECENT_ARRIVALS + 1);
        seeded.push_back(now);
        self.recent_arrivals.insert(service, seeded);
    }

    /// Records one arrival and recomputes the rolling headway as the mean
    /// gap between the retained timestamps, in minutes. The history is
    /// bounded; the oldest entry falls out first.
    pub fn record_arrival(&mut self, service: Service, timestamp: Timestamp) {
        let history = self.recent_arrivals.entry(service).or_insert_with(|| {
            warn!(
                stop = %self.id,
                line = %service.line,
                direction = %service.direction,
                "arrival for a service this stop is not associated with"
            );
            VecDeque::with_capacity(RECENT_ARRIVALS + 1)
        });
        history.push_back(timestamp);
        while history.len() > RECENT_ARRIVALS {
            history.pop_front();
        }
        let gaps: Vec<i64> = history
            .iter()
            .zip(history.iter().skip(1))
            .map(|(earlier, later)| later.seconds_since(*earlier))
            .collect();
        if !gaps.is_empty() {
            let mean = gaps.iter().sum::<i64>() as f64 / (60.0 * gaps.len() as f64);
            self.headway_minutes.insert(service, mean);
        }
    }

    /// Rolling headway for one service, if any arrivals have been seen.
    pub fn headway_minutes(&self, service: Service) -> Option<f64> {
        self.headway_minutes.get(&service).copied()
    }

    pub fn last_arrival(&self, service: Service) -> Option<Timestamp> {
        self.recent_arrivals.get(&service)?.back().copied()
    }

    pub fn recent_arrivals(&self, service: Service) -> Option<&VecDeque<Timestamp>> {
        self.recent_arrivals.get(&service)
    }

    pub fn feeder(&self, service: Service) -> Option<&SegmentKey> {
        self.feeders.get(&service)
    }

    /// Historical minutes between arrivals for one service and hour;
    /// 0.0 when unknown.
    pub fn expected_frequency_minutes(&self, service: Service, hour: u32) -> f64 {
        self.frequency
            .get(&service)
            .map(|series| series.median(hour))
            .unwrap_or(0.0)
    }

    /// Historical trip minutes to reach this stop for one service and
    /// hour; 0.0 when unknown.
    pub fn trip_duration_minutes(&self, service: Service, hour: u32) -> f64 {
        self.trip_duration
            .get(&service)
            .map(|series| series.median(hour))
            .unwrap_or(0.0)
    }

    /// Trains currently approaching this stop, soonest first.
    pub fn upcoming(&self) -> &[UpcomingArrival] {
        &self.upcoming
    }

    /// Rebuilds the approaching-trains view from the feeder segments.
    /// Called by evolve with a resolver into the segment registry.
    pub fn refresh_upcoming<'t, F>(&mut self, now: Timestamp, mut feeder_trains: F)
    where
        F: FnMut(&SegmentKey) -> Option<&'t HashMap<Arc<str>, ActiveTrain>>,
    {
        let mut upcoming: Vec<UpcomingArrival> = Vec::new();
        let mut late_seconds = 0.0;
        for (service, key) in &self.feeders {
            let Some(active) = feeder_trains(key) else {
                continue;
            };
            for (trip_id, train) in active {
                late_seconds += now.seconds_since(train.estimated_arrival).max(0) as f64;
                upcoming.push(UpcomingArrival {
                    trip_id: trip_id.clone(),
                    service: *service,
                    estimated_arrival: train.estimated_arrival,
                });
            }
        }
        upcoming.sort_by(|a, b| {
            (a.estimated_arrival, a.trip_id.as_ref()).cmp(&(b.estimated_arrival, b.trip_id.as_ref()))
        });
        self.upcoming = upcoming;
        self.approaching_late_seconds = late_seconds;
    }
}
