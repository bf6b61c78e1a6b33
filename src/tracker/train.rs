use std::sync::Arc;

use crate::{identity::TripId, shared::time::Timestamp};

use super::{SegmentKey, segment::Progress};

/// Lifecycle flag for a tracked train.
///
/// `Inactive` marks a train whose computed trip origin postdates its last
/// update, which only happens on corrupted or out-of-order data. It is not
/// terminal: the next segment change flips the train back to `Normal`, and
/// removal always goes through stall eviction instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrainStatus {
    #[default]
    Normal,
    Inactive,
}

/// What one report did to a train's segment assignment.
#[derive(Debug, Clone)]
pub struct Transition {
    pub segment_changed: bool,
    pub from: SegmentKey,
    pub to: SegmentKey,
}

/// One active train: a small state machine advanced by every report and
/// refreshed by every evolve pass. Owns the authoritative current-segment
/// fact; the mirrored segment registration is kept in sync by the tracker.
#[derive(Debug, Clone)]
pub struct TrainState {
    pub id: TripId,
    pub previous_stop: Arc<str>,
    pub next_stop: Arc<str>,
    /// Segment occupied before the most recent segment change.
    pub previous_segment: Option<SegmentKey>,
    pub status: TrainStatus,
    pub updated_at: Timestamp,
    pub scheduled_arrival: Timestamp,
    /// Nominal departure from the origin terminal, computed once from the id.
    pub trip_origin: Timestamp,
    pub last_stop_at: Timestamp,
    pub segment_started_at: Timestamp,
    pub is_late: bool,
    pub late_minutes: f64,
    /// Minutes elapsed since the trip origin, per the latest report.
    pub trip_minutes: f64,
    /// Minutes spent on the current segment, per the latest evolve pass.
    pub segment_minutes: f64,
    /// Interpolated progress along the current segment, 0.0 until the
    /// first evolve pass and clamped below 1.0 afterwards.
    pub fraction: f64,
    /// Share of the actual trip time in excess of the historical baseline.
    pub late_factor: f64,
    /// Historical median for the current segment, in minutes.
    expected_segment_minutes: f64,
    /// Expected minutes accumulated over all completed segments.
    composite_minutes: f64,
}

impl TrainState {
    pub fn new(
        id: TripId,
        previous_stop: Arc<str>,
        next_stop: Arc<str>,
        reported_at: Timestamp,
    ) -> Self {
        let trip_origin = id.trip_origin(reported_at);
        Self {
            id,
            previous_stop,
            next_stop,
            previous_segment: None,
            status: TrainStatus::Normal,
            updated_at: reported_at,
            scheduled_arrival: Timestamp::default(),
            trip_origin,
            last_stop_at: reported_at,
            segment_started_at: reported_at,
            is_late: false,
            late_minutes: 0.0,
            trip_minutes: 0.0,
            segment_minutes: 0.0,
            fraction: 0.0,
            late_factor: 0.0,
            expected_segment_minutes: 0.0,
            composite_minutes: 0.0,
        }
    }

    /// The segment this train currently occupies.
    pub fn segment(&self) -> SegmentKey {
        (self.previous_stop.clone(), self.next_stop.clone())
    }

    /// Advances the state machine on one report.
    ///
    /// A segment change is reported exactly when `next_stop` differs from
    /// the stored one; it resets the per-segment timers, clears lateness
    /// and returns the train to `Normal`. The lateness check afterwards is
    /// independent: a report stamped past its own scheduled arrival marks
    /// the train late again in the same call.
    pub fn update_trip(
        &mut self,
        timestamp: Timestamp,
        next_stop: &Arc<str>,
        scheduled_arrival: Timestamp,
    ) -> Transition {
        // A trip origin past the previous update means the id and the
        // clock disagree; flag it and keep going.
        if self.trip_origin > self.updated_at {
            self.status = TrainStatus::Inactive;
        }
        self.updated_at = timestamp;
        self.scheduled_arrival = scheduled_arrival;
        self.trip_minutes = timestamp.minutes_since(self.trip_origin);

        let from = self.segment();
        let mut segment_changed = false;
        if *next_stop != self.next_stop {
            segment_changed = true;
            self.last_stop_at = timestamp;
            self.previous_stop = std::mem::replace(&mut self.next_stop, next_stop.clone());
            self.previous_segment = Some(from.clone());
            self.is_late = false;
            self.late_minutes = 0.0;
            self.segment_started_at = timestamp;
            self.composite_minutes += self.expected_segment_minutes;
            self.status = TrainStatus::Normal;
        }

        if timestamp > self.scheduled_arrival {
            self.is_late = true;
            self.late_minutes = timestamp.minutes_since(self.scheduled_arrival);
        }

        Transition {
            segment_changed,
            from,
            to: self.segment(),
        }
    }

    /// Writes back one evolve pass: the interpolated segment progress plus
    /// the historical baselines for the current hour. `segment_median` is
    /// in seconds, `trip_median` in minutes.
    pub fn observe_progress(
        &mut self,
        now: Timestamp,
        progress: Progress,
        segment_median: f64,
        trip_median: f64,
    ) {
        self.segment_minutes = now.minutes_since(self.segment_started_at);
        self.expected_segment_minutes = segment_median / 60.0;
        self.late_factor = if trip_median == 0.0 || self.trip_minutes <= 0.0 {
            0.0
        } else {
            (self.trip_minutes - trip_median).max(0.0) / self.trip_minutes
        };
        self.fraction = progress.fraction;
        self.is_late = progress.is_late;
        self.late_minutes = now.minutes_since(self.scheduled_arrival).max(0.0);
    }

    /// Expected minutes for the trip so far: completed segments plus the
    /// current one, from the historical medians seen by evolve.
    pub fn composite_trip_minutes(&self) -> f64 {
        self.composite_minutes + self.expected_segment_minutes
    }
}
