use std::{collections::HashMap, sync::Arc};

use tracing::warn;

use crate::{
    feed::{
        self, Feed,
        models::{FeedEdge, FeedStop},
    },
    identity::Service,
    shared::geo::Coordinate,
};

type IdToIndex = HashMap<Arc<str>, usize>;
type IdToId = HashMap<Arc<str>, Arc<str>>;

/// A physical station as listed in the static feed. Ids use the canonical
/// (northbound) platform form.
#[derive(Debug, Default, Clone)]
pub struct StopRecord {
    pub id: Arc<str>,
    pub name: Arc<str>,
    pub location: Coordinate,
}

impl From<FeedStop> for StopRecord {
    fn from(value: FeedStop) -> Self {
        Self {
            id: value.stop_id.into(),
            name: value.stop_name.into(),
            location: Coordinate::new(value.stop_lat, value.stop_lon),
        }
    }
}

/// A directed edge between two adjacent platforms on one service.
#[derive(Debug, Clone)]
pub struct Edge {
    pub line: char,
    pub direction: char,
    pub origin: Arc<str>,
    pub destination: Arc<str>,
}

impl From<FeedEdge> for Edge {
    fn from(value: FeedEdge) -> Self {
        if value.line.is_empty() || value.direction.is_empty() {
            warn!(
                origin = %value.origin,
                destination = %value.destination,
                "edge row is missing its line or direction, it will match no service"
            );
        }
        Self {
            line: value.line.chars().next().unwrap_or(' '),
            direction: value.direction.chars().next().unwrap_or(' '),
            origin: value.origin.into(),
            destination: value.destination.into(),
        }
    }
}

/// The static rail network: the stop roster plus the directed edge list,
/// with a reverse origin-for-destination lookup.
#[derive(Debug, Clone, Default)]
pub struct Network {
    stops: Box<[StopRecord]>,
    edges: Box<[Edge]>,
    stop_lookup: Arc<IdToIndex>,
    origin_by_destination: Arc<IdToId>,
}

impl Network {
    pub fn new() -> Self {
        Default::default()
    }

    /// Streams the static bundle into the network.
    pub fn with_feed(self, feed: Feed) -> Result<Self, feed::Error> {
        let mut stops: Vec<StopRecord> = Vec::new();
        feed.stream_stops(|(_, stop)| stops.push(stop.into()))?;
        let mut edges: Vec<Edge> = Vec::new();
        feed.stream_edges(|(_, edge)| edges.push(edge.into()))?;
        Ok(self.with_records(stops, edges))
    }

    /// Builds the network from in-memory records. The edge order is kept:
    /// the reverse lookup answers with the first origin feeding each
    /// destination.
    pub fn with_records(mut self, stops: Vec<StopRecord>, edges: Vec<Edge>) -> Self {
        let mut stop_lookup: IdToIndex = HashMap::new();
        for (i, stop) in stops.iter().enumerate() {
            stop_lookup.insert(stop.id.clone(), i);
        }
        let mut origin_by_destination: IdToId = HashMap::new();
        for edge in &edges {
            origin_by_destination
                .entry(edge.destination.clone())
                .or_insert_with(|| edge.origin.clone());
        }
        self.stops = stops.into();
        self.edges = edges.into();
        self.stop_lookup = stop_lookup.into();
        self.origin_by_destination = origin_by_destination.into();
        self
    }

    pub fn stops(&self) -> &[StopRecord] {
        &self.stops
    }

    pub fn stop_by_id(&self, id: &str) -> Option<&StopRecord> {
        let index = self.stop_lookup.get(id)?;
        Some(&self.stops[*index])
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_for(&self, service: Service) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(move |edge| edge.line == service.line && edge.direction == service.direction)
    }

    /// The statically known stop feeding the given destination, if any.
    pub fn origin_for(&self, destination: &str) -> Option<&Arc<str>> {
        self.origin_by_destination.get(destination)
    }

    /// Every line that appears in the edge list, sorted and deduplicated.
    pub fn lines(&self) -> Vec<char> {
        let mut lines: Vec<char> = self.edges.iter().map(|edge| edge.line).collect();
        lines.sort_unstable();
        lines.dedup();
        lines
    }

    /// Every direction that appears in the edge list, sorted and deduplicated.
    pub fn directions(&self) -> Vec<char> {
        let mut directions: Vec<char> = self.edges.iter().map(|edge| edge.direction).collect();
        directions.sort_unstable();
        directions.dedup();
        directions
    }
}

/// The stop registry keys on the northbound form of each platform id;
/// directional ids are recast before lookups.
pub fn canonical_stop_id(stop_id: &str) -> Arc<str> {
    directional_stop_id(stop_id, 'N')
}

/// Recasts a platform id to the given direction by swapping its trailing
/// direction letter. Ids without one pass through unchanged.
pub fn directional_stop_id(stop_id: &str, direction: char) -> Arc<str> {
    match stop_id.char_indices().last() {
        Some((index, last)) if last.is_ascii_uppercase() => {
            format!("{}{}", &stop_id[..index], direction).into()
        }
        _ => stop_id.into(),
    }
}

/// Route tables carry sentinel rows that terminate a branch; they never
/// name a real platform and get no stop association.
pub fn is_sentinel_stop(stop_id: &str) -> bool {
    stop_id.contains("NULL") || stop_id.contains("FINAL")
}

#[test]
fn canonical_stop_id_test() {
    assert_eq!(canonical_stop_id("120S").as_ref(), "120N");
    assert_eq!(canonical_stop_id("120N").as_ref(), "120N");
    assert_eq!(canonical_stop_id("120").as_ref(), "120");
}

#[test]
fn directional_stop_id_test() {
    assert_eq!(directional_stop_id("120N", 'S').as_ref(), "120S");
}

#[test]
fn sentinel_stop_test() {
    assert!(is_sentinel_stop("1__NULL_STOP_N"));
    assert!(is_sentinel_stop("1_FINAL_N"));
    assert!(!is_sentinel_stop("120N"));
}

#[test]
fn blank_edge_service_fields_degrade_to_placeholder_test() {
    let edge = Edge::from(FeedEdge {
        line: String::new(),
        direction: String::new(),
        origin: "120N".to_string(),
        destination: "121N".to_string(),
    });
    assert_eq!(edge.line, ' ');
    assert_eq!(edge.direction, ' ');

    // The placeholder never matches a real service.
    let network = Network::new().with_records(Vec::new(), vec![edge]);
    assert_eq!(network.edges_for(Service::new('1', 'N')).count(), 0);
}

#[test]
fn origin_for_keeps_first_edge_test() {
    let edges = vec![
        Edge {
            line: '1',
            direction: 'N',
            origin: "118N".into(),
            destination: "119N".into(),
        },
        Edge {
            line: '2',
            direction: 'N',
            origin: "117N".into(),
            destination: "119N".into(),
        },
    ];
    let network = Network::new().with_records(Vec::new(), edges);
    assert_eq!(network.origin_for("119N").unwrap().as_ref(), "118N");
    assert!(network.origin_for("120N").is_none());
}
