use std::{collections::HashMap, sync::Arc};

use crate::identity::Service;

/// Name of the percentile every provider must expose.
pub const MEDIAN: &str = "50%";

/// What a historical series describes.
///
/// Stop series are keyed by the directional platform id; edge series by the
/// segment endpoints. Frequency and trip-duration values are minutes, edge
/// durations are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKey<'a> {
    /// Minutes between consecutive arrivals at a stop.
    StopFrequency(&'a str),
    /// Minutes a full trip takes to reach a stop.
    StopDuration(&'a str),
    /// Seconds a train takes to traverse one edge.
    Edge {
        origin: &'a str,
        destination: &'a str,
    },
}

/// Percentile statistics bucketed by local hour of day.
///
/// A missing hour or statistic is not an error, it reads as "unknown"
/// and yields 0.0 from the convenience accessors.
#[derive(Debug, Clone, Default)]
pub struct HourlySeries(HashMap<u32, HashMap<Arc<str>, f64>>);

impl HourlySeries {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, hour: u32, statistic: &str, value: f64) {
        self.0
            .entry(hour)
            .or_default()
            .insert(statistic.into(), value);
    }

    pub fn stat(&self, hour: u32, statistic: &str) -> Option<f64> {
        self.0.get(&hour)?.get(statistic).copied()
    }

    pub fn median(&self, hour: u32) -> f64 {
        self.stat(hour, MEDIAN).unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The read-only seam to the external aggregation subsystem.
///
/// Implementations are queried once per entity at registration time and
/// must answer every key; an empty [`HourlySeries`] is the "no history"
/// answer.
pub trait SeriesProvider {
    fn fetch_series(&self, service: Service, key: SeriesKey<'_>) -> HourlySeries;
}

/// Provider with no history at all. Every lookup degrades to 0.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSeries;

impl SeriesProvider for NullSeries {
    fn fetch_series(&self, _service: Service, _key: SeriesKey<'_>) -> HourlySeries {
        HourlySeries::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum OwnedKey {
    StopFrequency(Arc<str>),
    StopDuration(Arc<str>),
    Edge(Arc<str>, Arc<str>),
}

impl From<SeriesKey<'_>> for OwnedKey {
    fn from(value: SeriesKey<'_>) -> Self {
        match value {
            SeriesKey::StopFrequency(stop) => Self::StopFrequency(stop.into()),
            SeriesKey::StopDuration(stop) => Self::StopDuration(stop.into()),
            SeriesKey::Edge {
                origin,
                destination,
            } => Self::Edge(origin.into(), destination.into()),
        }
    }
}

/// In-memory provider backed by a plain table. Used by tests and by hosts
/// that load a precomputed statistics dump at startup.
#[derive(Debug, Default, Clone)]
pub struct TableSeries {
    table: HashMap<(Service, OwnedKey), HourlySeries>,
}

impl TableSeries {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, service: Service, key: SeriesKey<'_>, series: HourlySeries) {
        self.table.insert((service, key.into()), series);
    }
}

impl SeriesProvider for TableSeries {
    fn fetch_series(&self, service: Service, key: SeriesKey<'_>) -> HourlySeries {
        self.table
            .get(&(service, key.into()))
            .cloned()
            .unwrap_or_default()
    }
}

#[test]
fn missing_hour_reads_as_zero_test() {
    let series = HourlySeries::default();
    assert_eq!(series.median(9), 0.0);
}

#[test]
fn median_lookup_test() {
    let mut series = HourlySeries::new();
    series.insert(9, MEDIAN, 240.0);
    series.insert(9, "90%", 300.0);
    assert_eq!(series.median(9), 240.0);
    assert_eq!(series.stat(9, "90%"), Some(300.0));
    assert_eq!(series.median(10), 0.0);
}

#[test]
fn table_provider_test() {
    let service = Service::new('1', 'N');
    let mut series = HourlySeries::new();
    series.insert(8, MEDIAN, 120.0);
    let mut provider = TableSeries::new();
    provider.insert(service, SeriesKey::StopFrequency("120N"), series);

    let hit = provider.fetch_series(service, SeriesKey::StopFrequency("120N"));
    assert_eq!(hit.median(8), 120.0);
    let miss = provider.fetch_series(service, SeriesKey::StopDuration("120N"));
    assert!(miss.is_empty());
}
