use std::collections::HashMap;

use trackside::identity::Service;
use trackside::shared::geo::Coordinate;
use trackside::shared::time::Timestamp;
use trackside::tracker::StopState;

fn stop() -> StopState {
    StopState::new(
        "120N".into(),
        "Alpha".into(),
        Coordinate::new(40.7, -74.0),
        HashMap::new(),
        HashMap::new(),
    )
}

#[test]
fn rolling_headway_test() {
    let service = Service::new('1', 'N');
    let mut stop = stop();
    stop.associate_route(service, ("119N".into(), "120N".into()), Timestamp::from_epoch(0));

    // The seed is evicted once three real arrivals are in.
    stop.record_arrival(service, Timestamp::from_epoch(600));
    stop.record_arrival(service, Timestamp::from_epoch(900));
    stop.record_arrival(service, Timestamp::from_epoch(1500));

    let history = stop.recent_arrivals(service).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(*history.front().unwrap(), Timestamp::from_epoch(600));

    // ((900 - 600) + (1500 - 900)) / 2 / 60
    assert_eq!(stop.headway_minutes(service), Some(7.5));
    assert_eq!(stop.last_arrival(service), Some(Timestamp::from_epoch(1500)));
}

#[test]
fn history_is_bounded_test() {
    let service = Service::new('1', 'N');
    let mut stop = stop();
    stop.associate_route(service, ("119N".into(), "120N".into()), Timestamp::from_epoch(0));
    for epoch in [100, 200, 300, 400, 500] {
        stop.record_arrival(service, Timestamp::from_epoch(epoch));
    }
    let history = stop.recent_arrivals(service).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(*history.front().unwrap(), Timestamp::from_epoch(300));
}

#[test]
fn unassociated_arrival_seeds_history_test() {
    let service = Service::new('7', 'S');
    let mut stop = stop();
    stop.record_arrival(service, Timestamp::from_epoch(600));

    assert_eq!(stop.recent_arrivals(service).unwrap().len(), 1);
    // A single timestamp has no gaps, so no headway yet.
    assert_eq!(stop.headway_minutes(service), None);
}

#[test]
fn association_seeds_current_time_test() {
    let service = Service::new('1', 'N');
    let mut stop = stop();
    stop.associate_route(service, ("119N".into(), "120N".into()), Timestamp::from_epoch(50));
    assert_eq!(stop.last_arrival(service), Some(Timestamp::from_epoch(50)));
    assert_eq!(
        stop.feeder(service),
        Some(&("119N".into(), "120N".into()))
    );
}
