//! Lazy passenger schedules.

use chrono::{Duration, NaiveDateTime};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rider_demand_factors_models::{Conditions, FlowResult, Model};

use crate::flow;

/// A finite, restartable sequence of [`FlowResult`]s covering every
/// location of a model at each interval boundary in `[start, end)`.
///
/// Results are ordered by time, then by location id. The real-time
/// conditions are captured when the schedule is created, and the variance
/// draws come from an RNG seeded once, so [`restart`](Self::restart) and
/// [`Clone`] both replay the exact same sequence.
#[derive(Debug, Clone)]
pub struct PassengerSchedule<'a> {
    model: &'a Model,
    location_ids: Vec<&'a str>,
    conditions: Conditions,
    start: NaiveDateTime,
    end: NaiveDateTime,
    interval_minutes: u32,
    seed: u64,
    rng: StdRng,
    cursor: NaiveDateTime,
    location_index: usize,
}

impl<'a> PassengerSchedule<'a> {
    pub(crate) fn new(
        model: &'a Model,
        conditions: Conditions,
        start: NaiveDateTime,
        end: NaiveDateTime,
        interval_minutes: u32,
        seed: u64,
    ) -> Self {
        Self {
            model,
            location_ids: model.locations.keys().map(String::as_str).collect(),
            conditions,
            start,
            end,
            interval_minutes,
            seed,
            rng: StdRng::seed_from_u64(seed),
            cursor: start,
            location_index: 0,
        }
    }

    /// Seed driving the variance draws.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Rewinds to the first result. The replayed sequence is identical to
    /// the one already produced.
    pub fn restart(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.cursor = self.start;
        self.location_index = 0;
    }

    /// Total number of results the full schedule yields.
    #[must_use]
    pub fn total_len(&self) -> usize {
        steps_between(self.start, self.end, self.interval_minutes) * self.location_ids.len()
    }

    fn is_exhausted(&self) -> bool {
        self.interval_minutes == 0 || self.location_ids.is_empty() || self.cursor >= self.end
    }
}

fn steps_between(start: NaiveDateTime, end: NaiveDateTime, interval_minutes: u32) -> usize {
    if interval_minutes == 0 || end <= start {
        return 0;
    }
    let span = (end - start).num_seconds();
    let step = i64::from(interval_minutes) * 60;
    usize::try_from((span + step - 1) / step).unwrap_or(usize::MAX)
}

impl Iterator for PassengerSchedule<'_> {
    type Item = FlowResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_exhausted() {
            return None;
        }

        let id = self.location_ids[self.location_index];
        let location = self.model.locations.get(id)?;
        let result = flow::evaluate(
            self.model,
            id,
            location,
            &self.conditions,
            self.cursor,
            self.interval_minutes,
            &mut self.rng,
        );

        self.location_index += 1;
        if self.location_index == self.location_ids.len() {
            self.location_index = 0;
            self.cursor += Duration::minutes(i64::from(self.interval_minutes));
        }

        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.is_exhausted() {
            return (0, Some(0));
        }
        let remaining_steps = steps_between(self.cursor, self.end, self.interval_minutes);
        let remaining = remaining_steps * self.location_ids.len() - self.location_index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PassengerSchedule<'_> {}

impl std::iter::FusedIterator for PassengerSchedule<'_> {}
