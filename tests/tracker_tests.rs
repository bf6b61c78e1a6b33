use trackside::identity::Service;
use trackside::shared::geo::Coordinate;
use trackside::shared::time::Timestamp;
use trackside::stats::{HourlySeries, MEDIAN, NullSeries, SeriesKey, TableSeries};
use trackside::topology::{Edge, Network, StopRecord};
use trackside::tracker::{Report, Tracker, TrackerConfig, TrainStatus};

fn stop_record(id: &str, name: &str) -> StopRecord {
    StopRecord {
        id: id.into(),
        name: name.into(),
        location: Coordinate::new(40.7, -74.0),
    }
}

fn edge(origin: &str, destination: &str) -> Edge {
    Edge {
        line: '1',
        direction: 'N',
        origin: origin.into(),
        destination: destination.into(),
    }
}

fn network() -> Network {
    let stops = vec![
        stop_record("101N", "Origin Terminal"),
        stop_record("120N", "Alpha"),
        stop_record("121N", "Beta"),
    ];
    let edges = vec![edge("101N", "120N"), edge("120N", "121N")];
    Network::new().with_records(stops, edges)
}

fn tracker() -> Tracker {
    Tracker::new(
        network(),
        Box::new(NullSeries),
        TrackerConfig {
            lines: vec!['1'],
            directions: vec!['N'],
            stall_after_minutes: 10.0,
        },
    )
}

fn report(trip_id: &str, timestamp: i64, stop: &str, arrive: i64, depart: i64) -> Report {
    Report {
        trip_id: trip_id.into(),
        timestamp,
        stop: stop.into(),
        arrive,
        depart,
    }
}

const TRIP: &str = "0090_1.TRIP123.N";

#[test]
fn creation_registers_on_inferred_segment_test() {
    let mut tracker = tracker();
    tracker
        .apply_report(&report(TRIP, 1000, "120N", 1100, 1050))
        .unwrap();

    let train = tracker.train_by_id(TRIP).unwrap();
    assert_eq!(train.previous_stop.as_ref(), "101N");
    assert_eq!(train.next_stop.as_ref(), "120N");

    let segment = tracker.segment_by_key("101N", "120N").unwrap();
    assert!(segment.active_trains().contains_key(TRIP));
    assert_eq!(segment.active_count(), 1);
}

#[test]
fn segment_change_moves_registration_test() {
    let mut tracker = tracker();
    tracker
        .apply_report(&report(TRIP, 1000, "120N", 1100, 1050))
        .unwrap();
    tracker
        .apply_report(&report(TRIP, 1200, "121N", 1300, 1250))
        .unwrap();

    let train = tracker.train_by_id(TRIP).unwrap();
    assert_eq!(train.previous_stop.as_ref(), "120N");
    assert_eq!(train.next_stop.as_ref(), "121N");
    assert_eq!(
        train.previous_segment,
        Some(("101N".into(), "120N".into()))
    );

    assert_eq!(tracker.segment_by_key("101N", "120N").unwrap().active_count(), 0);
    let segment = tracker.segment_by_key("120N", "121N").unwrap();
    assert!(segment.active_trains().contains_key(TRIP));

    // The destination stop heard about the arrival.
    let stop = tracker.stop_by_id("121N").unwrap();
    assert_eq!(
        stop.last_arrival(Service::new('1', 'N')),
        Some(Timestamp::from_epoch(1200))
    );
}

#[test]
fn unchanged_next_stop_never_changes_segment_test() {
    let mut tracker = tracker();
    for (timestamp, arrive) in [(1000, 1100), (1030, 1110), (1060, 1120)] {
        tracker
            .apply_report(&report(TRIP, timestamp, "120N", arrive, arrive - 20))
            .unwrap();
    }

    let train = tracker.train_by_id(TRIP).unwrap();
    assert_eq!(train.next_stop.as_ref(), "120N");
    // Last writer wins on the schedule.
    assert_eq!(train.scheduled_arrival, Timestamp::from_epoch(1120));
    assert_eq!(tracker.segment_by_key("101N", "120N").unwrap().active_count(), 1);
}

#[test]
fn unknown_destination_degrades_to_self_origin_test() {
    let mut tracker = tracker();
    tracker
        .apply_report(&report(TRIP, 1000, "999N", 1100, 1050))
        .unwrap();

    let train = tracker.train_by_id(TRIP).unwrap();
    assert_eq!(train.previous_stop.as_ref(), "999N");
    let segment = tracker.segment_by_key("999N", "999N").unwrap();
    assert!(segment.active_trains().contains_key(TRIP));
}

#[test]
fn purge_threshold_is_strict_test() {
    let mut tracker = tracker();
    tracker
        .apply_report(&report(TRIP, 1000, "120N", 1100, 1050))
        .unwrap();

    // Exactly ten minutes idle is retained.
    tracker
        .purge_stalled(Timestamp::from_epoch(1600), 10.0)
        .unwrap();
    assert_eq!(tracker.active_train_count(), 1);

    tracker
        .purge_stalled(Timestamp::from_epoch(1601), 10.0)
        .unwrap();
    assert_eq!(tracker.active_train_count(), 0);
    assert_eq!(tracker.segment_by_key("101N", "120N").unwrap().active_count(), 0);
}

#[test]
fn ingest_filters_and_skips_malformed_test() {
    let mut tracker = tracker();
    let batch = vec![
        report("0090_2.TRIP9.N", 1000, "120N", 1100, 1050),
        report("garbage", 1000, "120N", 1100, 1050),
        report(TRIP, 1010, "120N", 1100, 1050),
    ];
    tracker.ingest(&batch).unwrap();

    assert_eq!(tracker.active_train_count(), 1);
    assert!(tracker.train_by_id(TRIP).is_some());
}

#[test]
fn ingest_purges_once_per_batch_test() {
    let mut tracker = tracker();
    tracker
        .ingest(&[report(TRIP, 1000, "120N", 1100, 1050)])
        .unwrap();

    // The next batch's reference time makes the first train stale.
    let other = "0095_1.TRIP456.N";
    tracker
        .ingest(&[report(other, 2000, "120N", 2100, 2050)])
        .unwrap();

    assert!(tracker.train_by_id(TRIP).is_none());
    assert!(tracker.train_by_id(other).is_some());
}

#[test]
fn evolve_writes_back_progress_test() {
    let mut tracker = tracker();
    tracker
        .apply_report(&report(TRIP, 1000, "120N", 1100, 1050))
        .unwrap();

    tracker.evolve(Timestamp::from_epoch(1050)).unwrap();
    let train = tracker.train_by_id(TRIP).unwrap();
    assert_eq!(train.fraction, 0.5);
    assert!(!train.is_late);

    // The destination stop sees the train approaching on its feeder.
    let stop = tracker.stop_by_id("120N").unwrap();
    assert_eq!(stop.upcoming().len(), 1);
    assert_eq!(stop.upcoming()[0].trip_id.as_ref(), TRIP);

    // Past the clamp the marker holds short and the train reads late.
    tracker.evolve(Timestamp::from_epoch(1160)).unwrap();
    let train = tracker.train_by_id(TRIP).unwrap();
    assert_eq!(train.fraction, 0.98);
    assert!(train.is_late);
    assert_eq!(train.late_minutes, 1.0);

    let segment = tracker.segment_by_key("101N", "120N").unwrap();
    assert_eq!(segment.max_late_minutes, 1.0);
    let stop = tracker.stop_by_id("120N").unwrap();
    assert_eq!(stop.approaching_late_seconds, 60.0);
}

#[test]
fn evolve_applies_historical_baselines_test() {
    let service = Service::new('1', 'N');
    // One hour past the 54-second trip origin embedded in the id, with the
    // evolve pass one minute later in the same local hour.
    let start_of_day = Timestamp::from_epoch(200_000).start_of_day();
    let t0 = start_of_day + 3_654;
    let now = t0 + 60;
    let hour = now.hour();

    let mut provider = TableSeries::new();
    let mut edge_median = HourlySeries::new();
    edge_median.insert(hour, MEDIAN, 120.0);
    provider.insert(
        service,
        SeriesKey::Edge {
            origin: "101N",
            destination: "120N",
        },
        edge_median,
    );
    let mut trip_median = HourlySeries::new();
    trip_median.insert(hour, MEDIAN, 1.0);
    provider.insert(service, SeriesKey::StopDuration("120N"), trip_median);
    let mut frequency = HourlySeries::new();
    frequency.insert(hour, MEDIAN, 5.0);
    provider.insert(service, SeriesKey::StopFrequency("120N"), frequency);

    let mut tracker = Tracker::new(
        network(),
        Box::new(provider),
        TrackerConfig {
            lines: vec!['1'],
            directions: vec!['N'],
            stall_after_minutes: 10.0,
        },
    );
    tracker
        .apply_report(&report(
            TRIP,
            t0.as_epoch(),
            "120N",
            t0.as_epoch() + 300,
            t0.as_epoch() + 280,
        ))
        .unwrap();
    tracker.evolve(now).unwrap();

    let train = tracker.train_by_id(TRIP).unwrap();
    assert_eq!(train.trip_minutes, 60.0);
    // One minute of historical trip baseline against a sixty-minute trip.
    assert_eq!(train.late_factor, 59.0 / 60.0);
    // The 120-second edge median is the only expected segment so far.
    assert_eq!(train.composite_trip_minutes(), 2.0);
    assert_eq!(train.segment_minutes, 1.0);

    let stop = tracker.stop_by_id("120N").unwrap();
    assert_eq!(stop.expected_frequency_minutes(service, hour), 5.0);
}

#[test]
fn future_trip_origin_marks_inactive_test() {
    let mut tracker = tracker();
    // Ten seconds after local midnight the id's 54-second offset is still
    // in the future, which flags the data as suspect.
    let t0 = Timestamp::from_epoch(200_000).start_of_day() + 10;
    tracker
        .apply_report(&report(
            TRIP,
            t0.as_epoch(),
            "120N",
            t0.as_epoch() + 100,
            t0.as_epoch() + 80,
        ))
        .unwrap();
    assert_eq!(tracker.train_by_id(TRIP).unwrap().status, TrainStatus::Inactive);

    // A segment change clears the flag.
    tracker
        .apply_report(&report(
            TRIP,
            t0.as_epoch() + 120,
            "121N",
            t0.as_epoch() + 220,
            t0.as_epoch() + 200,
        ))
        .unwrap();
    assert_eq!(tracker.train_by_id(TRIP).unwrap().status, TrainStatus::Normal);
}
