use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

mod segment;
mod stop;
mod train;
pub use segment::*;
pub use stop::*;
pub use train::*;

use crate::{
    identity::{self, Service, TripId},
    shared::time::Timestamp,
    stats::{SeriesKey, SeriesProvider},
    topology::{Edge, Network, StopRecord, canonical_stop_id, directional_stop_id, is_sentinel_stop},
};

/// A segment is addressed by its endpoints.
pub type SegmentKey = (Arc<str>, Arc<str>);

type TrainsById = HashMap<Arc<str>, TrainState>;
type SegmentsByKey = HashMap<SegmentKey, RouteSegment>;
type StopsById = HashMap<Arc<str>, StopState>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Trip id error: {0}")]
    Identity(#[from] identity::ParseError),
    #[error("Train {0} is not in the registry")]
    UnknownTrain(String),
    #[error("No segment {origin} -> {destination} in the registry")]
    UnknownSegment {
        origin: Arc<str>,
        destination: Arc<str>,
    },
    #[error("Train {trip} is not registered on segment {origin} -> {destination}")]
    TrainNotOnSegment {
        trip: String,
        origin: Arc<str>,
        destination: Arc<str>,
    },
}

/// One position report from the live stream, one per train observation.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Report {
    pub trip_id: String,
    /// When the observation was made, epoch seconds.
    pub timestamp: i64,
    /// The stop the train is heading for.
    pub stop: String,
    /// Scheduled arrival at that stop, epoch seconds.
    pub arrive: i64,
    /// Scheduled departure from that stop, epoch seconds.
    pub depart: i64,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Lines to track. Empty means every line in the static network.
    pub lines: Vec<char>,
    /// Directions to track. Empty means every direction in the network.
    pub directions: Vec<char>,
    /// Minutes without a report before a train is purged.
    pub stall_after_minutes: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            directions: Vec::new(),
            stall_after_minutes: 10.0,
        }
    }
}

/// The live tracking core.
///
/// Owns the three registries - trains, segments, stops - and mediates every
/// mutation so the mirrored train/segment memberships stay consistent.
/// Callers drive it serially: ingest a batch, evolve, repeat. Nothing here
/// blocks, suspends or retries; a host that wants concurrent ingestion must
/// serialize access behind its own coordination point.
pub struct Tracker {
    config: TrackerConfig,
    lines: Vec<char>,
    directions: Vec<char>,
    network: Network,
    stats: Box<dyn SeriesProvider>,
    trains: TrainsById,
    segments: SegmentsByKey,
    stops: StopsById,
}

impl Tracker {
    /// Builds the tracker over a static network: one stop entry per listed
    /// station, one segment per statically known edge of the tracked
    /// services, each seeded with its historical series from the provider.
    pub fn new(network: Network, stats: Box<dyn SeriesProvider>, config: TrackerConfig) -> Self {
        let lines = if config.lines.is_empty() {
            network.lines()
        } else {
            config.lines.clone()
        };
        let directions = if config.directions.is_empty() {
            network.directions()
        } else {
            config.directions.clone()
        };
        let mut tracker = Self {
            config,
            lines,
            directions,
            network,
            stats,
            trains: HashMap::new(),
            segments: HashMap::new(),
            stops: HashMap::new(),
        };
        let now = Timestamp::now();
        tracker.register_stops();
        tracker.register_static_segments(now);
        info!(
            stops = tracker.stops.len(),
            segments = tracker.segments.len(),
            "initialized static network"
        );
        tracker
    }

    fn services(&self) -> Vec<Service> {
        let mut services = Vec::with_capacity(self.lines.len() * self.directions.len());
        for &line in &self.lines {
            for &direction in &self.directions {
                services.push(Service::new(line, direction));
            }
        }
        services
    }

    fn accepts(&self, service: Service) -> bool {
        self.lines.contains(&service.line) && self.directions.contains(&service.direction)
    }

    fn register_stops(&mut self) {
        let services = self.services();
        let records: Vec<StopRecord> = self.network.stops().to_vec();
        for record in records {
            let mut frequency = HashMap::new();
            let mut trip_duration = HashMap::new();
            for &service in &services {
                let platform = directional_stop_id(record.id.as_ref(), service.direction);
                frequency.insert(
                    service,
                    self.stats
                        .fetch_series(service, SeriesKey::StopFrequency(platform.as_ref())),
                );
                trip_duration.insert(
                    service,
                    self.stats
                        .fetch_series(service, SeriesKey::StopDuration(platform.as_ref())),
                );
            }
            let stop = StopState::new(
                canonical_stop_id(record.id.as_ref()),
                record.name.clone(),
                record.location,
                frequency,
                trip_duration,
            );
            self.stops.insert(stop.id.clone(), stop);
        }
    }

    fn register_static_segments(&mut self, now: Timestamp) {
        for service in self.services() {
            let edges: Vec<Edge> = self.network.edges_for(service).cloned().collect();
            for edge in edges {
                let key = (edge.origin.clone(), edge.destination.clone());
                if !self.segments.contains_key(&key) {
                    let stats = self.stats.fetch_series(
                        service,
                        SeriesKey::Edge {
                            origin: edge.origin.as_ref(),
                            destination: edge.destination.as_ref(),
                        },
                    );
                    self.segments.insert(
                        key.clone(),
                        RouteSegment::new(edge.origin.clone(), edge.destination.clone(), stats),
                    );
                }
                if is_sentinel_stop(edge.destination.as_ref()) {
                    continue;
                }
                let station = canonical_stop_id(edge.destination.as_ref());
                match self.stops.get_mut(station.as_ref()) {
                    Some(stop) => stop.associate_route(service, key, now),
                    None => debug!(stop = %station, "edge destination has no stop entry"),
                }
            }
        }
    }

    /// Looks up a segment, creating it with freshly fetched statistics when
    /// an edge first shows up in live data.
    fn get_or_create_segment(
        &mut self,
        service: Service,
        origin: &Arc<str>,
        destination: &Arc<str>,
    ) -> &mut RouteSegment {
        let key = (origin.clone(), destination.clone());
        match self.segments.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(origin = %origin, destination = %destination, "creating route segment on demand");
                let stats = self.stats.fetch_series(
                    service,
                    SeriesKey::Edge {
                        origin: origin.as_ref(),
                        destination: destination.as_ref(),
                    },
                );
                entry.insert(RouteSegment::new(
                    origin.clone(),
                    destination.clone(),
                    stats,
                ))
            }
        }
    }

    /// Applies one report.
    ///
    /// Unseen trains are created on the segment between their statically
    /// inferred previous stop and the reported next stop; when no static
    /// origin feeds the stop, the destination stands in as its own origin
    /// and the degraded data is logged. A segment change moves the train's
    /// registration atomically and notifies the destination stop.
    pub fn apply_report(&mut self, report: &Report) -> Result<(), Error> {
        let trip = TripId::parse(&report.trip_id)?;
        let timestamp = Timestamp::from_epoch(report.timestamp);
        // Some trains report departures after their arrival; the later of
        // the two is the schedule to hold them to.
        let scheduled_arrival = Timestamp::from_epoch(report.arrive.max(report.depart));
        let next_stop: Arc<str> = report.stop.as_str().into();

        if !self.trains.contains_key(report.trip_id.as_str()) {
            let previous_stop = match self.network.origin_for(next_stop.as_ref()) {
                Some(origin) => origin.clone(),
                None => {
                    warn!(
                        stop = %next_stop,
                        trip = %report.trip_id,
                        "no static origin feeds this stop, treating it as its own origin"
                    );
                    next_stop.clone()
                }
            };
            let train = TrainState::new(trip.clone(), previous_stop, next_stop.clone(), timestamp);
            let key = train.segment();
            self.get_or_create_segment(trip.service, &key.0, &key.1).add_train(
                trip.raw_arc(),
                timestamp,
                scheduled_arrival,
            );
            self.trains.insert(trip.raw_arc(), train);
        }

        let transition = match self.trains.get_mut(report.trip_id.as_str()) {
            Some(train) => train.update_trip(timestamp, &next_stop, scheduled_arrival),
            None => return Err(Error::UnknownTrain(report.trip_id.clone())),
        };

        if transition.segment_changed {
            match self.segments.get_mut(&transition.from) {
                Some(segment) => {
                    segment.clear_train(&report.trip_id)?;
                }
                None => {
                    return Err(Error::UnknownSegment {
                        origin: transition.from.0.clone(),
                        destination: transition.from.1.clone(),
                    });
                }
            }
            self.get_or_create_segment(trip.service, &transition.to.0, &transition.to.1)
                .add_train(trip.raw_arc(), timestamp, scheduled_arrival);

            let station = canonical_stop_id(transition.to.1.as_ref());
            match self.stops.get_mut(station.as_ref()) {
                Some(stop) => stop.record_arrival(trip.service, timestamp),
                None => warn!(stop = %station, "segment change reached a stop outside the registry"),
            }
        }
        Ok(())
    }

    /// Ingests one batch of reports in order, then evicts stalled trains
    /// once, using the first accepted report's timestamp as "now". Reports
    /// for untracked services are dropped; reports with ids that fail the
    /// wire contract are logged and skipped, never requeued. A later report
    /// for the same train overrides an earlier one in the same batch.
    pub fn ingest(&mut self, batch: &[Report]) -> Result<(), Error> {
        let mut reference: Option<Timestamp> = None;
        for report in batch {
            let service = match Service::parse(&report.trip_id) {
                Ok(service) => service,
                Err(error) => {
                    warn!(trip = %report.trip_id, %error, "skipping report with malformed trip id");
                    continue;
                }
            };
            if !self.accepts(service) {
                continue;
            }
            match self.apply_report(report) {
                Ok(()) => {
                    reference.get_or_insert(Timestamp::from_epoch(report.timestamp));
                }
                Err(Error::Identity(error)) => {
                    warn!(trip = %report.trip_id, %error, "skipping report with malformed trip id");
                }
                Err(error) => return Err(error),
            }
        }
        if let Some(now) = reference {
            self.purge_stalled(now, self.config.stall_after_minutes)?;
        }
        Ok(())
    }

    /// Recomputes the derived state for every live entity at `now`: each
    /// train's interpolated fraction and lateness against the current
    /// hour's medians, each segment's worst-lateness summary, each stop's
    /// approaching-trains view. Creates and evicts nothing.
    pub fn evolve(&mut self, now: Timestamp) -> Result<(), Error> {
        let hour = now.hour();
        for train in self.trains.values_mut() {
            let key = train.segment();
            let Some(segment) = self.segments.get_mut(&key) else {
                return Err(Error::UnknownSegment {
                    origin: key.0,
                    destination: key.1,
                });
            };
            let progress = segment.position(train.id.raw(), now)?;
            let segment_median = segment.median_duration(hour);
            let station = canonical_stop_id(key.1.as_ref());
            let trip_median = self
                .stops
                .get(station.as_ref())
                .map(|stop| stop.trip_duration_minutes(train.id.service, hour))
                .unwrap_or(0.0);
            train.observe_progress(now, progress, segment_median, trip_median);
        }

        let trains = &self.trains;
        for segment in self.segments.values_mut() {
            let mut max_late = 0.0f64;
            for trip_id in segment.trip_ids() {
                if let Some(train) = trains.get(trip_id.as_ref()) {
                    max_late = max_late.max(train.late_minutes);
                }
            }
            segment.max_late_minutes = max_late;
        }

        let segments = &self.segments;
        for stop in self.stops.values_mut() {
            stop.refresh_upcoming(now, |key| {
                segments.get(key).map(|segment| segment.active_trains())
            });
        }
        Ok(())
    }

    /// Removes every train idle strictly longer than `wait_minutes`,
    /// deregistering it from its segment. This is the only path that
    /// removes a train.
    pub fn purge_stalled(&mut self, now: Timestamp, wait_minutes: f64) -> Result<(), Error> {
        let stalled: Vec<Arc<str>> = self
            .trains
            .values()
            .filter(|train| now.minutes_since(train.updated_at) > wait_minutes)
            .map(|train| train.id.raw_arc())
            .collect();
        for trip_id in stalled {
            let Some(train) = self.trains.remove(trip_id.as_ref()) else {
                continue;
            };
            let key = train.segment();
            let Some(segment) = self.segments.get_mut(&key) else {
                return Err(Error::UnknownSegment {
                    origin: key.0,
                    destination: key.1,
                });
            };
            segment.clear_train(trip_id.as_ref())?;
            info!(
                trip = %trip_id,
                idle_minutes = now.minutes_since(train.updated_at),
                origin = %key.0,
                destination = %key.1,
                "purging stalled train"
            );
        }
        Ok(())
    }

    pub fn train_by_id(&self, trip_id: &str) -> Option<&TrainState> {
        self.trains.get(trip_id)
    }

    pub fn trains(&self) -> impl Iterator<Item = &TrainState> {
        self.trains.values()
    }

    pub fn active_train_count(&self) -> usize {
        self.trains.len()
    }

    pub fn segment_by_key(&self, origin: &str, destination: &str) -> Option<&RouteSegment> {
        self.segments
            .get(&(Arc::from(origin), Arc::from(destination)))
    }

    pub fn segments(&self) -> impl Iterator<Item = &RouteSegment> {
        self.segments.values()
    }

    /// Looks up a stop. Directional platform ids are recast to the
    /// registry's canonical form first.
    pub fn stop_by_id(&self, stop_id: &str) -> Option<&StopState> {
        self.stops.get(canonical_stop_id(stop_id).as_ref())
    }

    pub fn stops(&self) -> impl Iterator<Item = &StopState> {
        self.stops.values()
    }
}
