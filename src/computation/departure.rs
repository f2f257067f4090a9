use std::cmp;

use crate::distribution::{self, Distribution};
use crate::error::{self, Error};
use crate::types::{MFloat, Mtime};

/// What determines when the train itself is ready to depart.
#[derive(Debug, Clone, Copy)]
pub enum TrainInfo<'a> {
    /// First stop of the trip: delay distribution of the trip start.
    Start { distribution: &'a Distribution },
    /// Arrival of the same train at this station.
    Preceding {
        distribution: &'a Distribution,
        scheduled_arrival: Mtime,
        min_standing: Mtime,
    },
}

impl<'a> TrainInfo<'a> {
    pub fn sum(&self) -> MFloat {
        match self {
            TrainInfo::Start { .. } => 1.0,
            TrainInfo::Preceding { distribution, .. } => distribution.sum(),
        }
    }

    /// Delay of the governing distribution that makes the train ready at `t`.
    fn delay_at(&self, scheduled_departure: Mtime, t: Mtime) -> Mtime {
        match self {
            TrainInfo::Start { .. } => t - scheduled_departure,
            TrainInfo::Preceding { scheduled_arrival, min_standing, .. } => t - min_standing - scheduled_arrival,
        }
    }

    fn distribution(&self) -> &'a Distribution {
        match *self {
            TrainInfo::Start { distribution } => distribution,
            TrainInfo::Preceding { distribution, .. } => distribution,
        }
    }

    pub(crate) fn ready_at_schedule(&self, scheduled_departure: Mtime) -> MFloat {
        self.distribution()
            .probability_smaller_equal(self.delay_at(scheduled_departure, scheduled_departure))
    }

    pub(crate) fn ready_at(&self, scheduled_departure: Mtime, t: Mtime) -> MFloat {
        self.distribution().probability_equal(self.delay_at(scheduled_departure, t))
    }

    pub(crate) fn ready_before(&self, scheduled_departure: Mtime, t: Mtime) -> MFloat {
        self.distribution().probability_smaller(self.delay_at(scheduled_departure, t))
    }

    fn latest_delay(&self, scheduled_departure: Mtime) -> Mtime {
        match self {
            TrainInfo::Start { distribution } => cmp::max(0, distribution.last_minute()),
            TrainInfo::Preceding { distribution, scheduled_arrival, min_standing } => {
                cmp::max(0, scheduled_arrival + distribution.last_minute() + min_standing - scheduled_departure)
            }
        }
    }
}

/// Arriving train the departure waits for.
#[derive(Debug, Clone, Copy)]
pub struct FeederInfo<'a> {
    pub distribution: &'a Distribution,
    pub scheduled_arrival: Mtime,
    pub transfer_time: Mtime,
    pub waiting_time: Mtime,
    /// Latest arrival that still allows the transfer.
    pub latest_feasible_arrival: Mtime,
}

impl<'a> FeederInfo<'a> {
    pub fn new(distribution: &'a Distribution, scheduled_arrival: Mtime, scheduled_departure: Mtime, transfer_time: Mtime, waiting_time: Mtime) -> FeederInfo<'a> {
        FeederInfo {
            distribution,
            scheduled_arrival,
            transfer_time,
            waiting_time,
            latest_feasible_arrival: scheduled_departure + waiting_time - transfer_time,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepartureData<'a> {
    pub scheduled_departure: Mtime,
    pub train: TrainInfo<'a>,
    pub feeders: Vec<FeederInfo<'a>>,
    pub maximum_waiting_time: Mtime,
    /// Observed departure time if an IS message was received.
    pub is_message: Option<Mtime>,
}

impl<'a> DepartureData<'a> {
    pub fn new(scheduled_departure: Mtime, train: TrainInfo<'a>, feeders: Vec<FeederInfo<'a>>, is_message: Option<Mtime>) -> DepartureData<'a> {
        let maximum_waiting_time = feeders.iter().map(|f| f.waiting_time).max().unwrap_or(0);
        DepartureData {
            scheduled_departure,
            train,
            feeders,
            maximum_waiting_time,
            is_message,
        }
    }

    pub fn largest_delay(&self) -> Mtime {
        cmp::max(self.train.latest_delay(self.scheduled_departure), self.maximum_waiting_time)
    }
}

/// Probability that no feeder delays a departure at `t`.
pub(crate) fn departure_independent_from_feeders(feeders: &[FeederInfo], t: Mtime) -> MFloat {
    feeders
        .iter()
        .map(|f| {
            let waiting_interval_begin = t - f.transfer_time;
            if waiting_interval_begin >= f.latest_feasible_arrival {
                1.0
            } else {
                1.0 - (f.distribution.probability_smaller_equal(f.latest_feasible_arrival - f.scheduled_arrival)
                    - f.distribution.probability_smaller_equal(waiting_interval_begin - f.scheduled_arrival))
            }
        })
        .product()
}

/// Feeder distributions with all mass after the latest feasible arrival removed.
pub(crate) fn cut_after_latest_feasible_arrival(feeders: &[FeederInfo]) -> Vec<Distribution> {
    feeders
        .iter()
        .map(|f| {
            debug_assert!(f.latest_feasible_arrival >= f.scheduled_arrival);
            f.distribution.truncated_after(f.latest_feasible_arrival - f.scheduled_arrival)
        })
        .collect()
}

/// Probability that the last feasible feeder arrives exactly so that the departure is at `t`.
/// Difference of the cumulative products of "no feeder later than t" and "no feeder later than t-1".
pub(crate) fn had_to_wait_for_feeders(feeders: &[FeederInfo], cut: &[Distribution], t: Mtime) -> MFloat {
    debug_assert_eq!(feeders.len(), cut.len());
    if feeders.is_empty() {
        return 0.0;
    }
    let mut not_later_than_t = 1.0;
    let mut not_later_than_previous = 1.0;
    for (f, d) in feeders.iter().zip(cut) {
        let feeder_delay = t - f.transfer_time - f.scheduled_arrival;
        not_later_than_t *= 1.0 - d.probability_greater(feeder_delay);
        not_later_than_previous *= 1.0 - d.probability_greater(feeder_delay - 1);
    }
    not_later_than_t - not_later_than_previous
}

/// Builds the final distribution starting at delay 0 and enforces that no mass was created.
pub(crate) fn finish(mut probabilities: Vec<MFloat>, governing_sum: MFloat) -> Distribution {
    let sum: MFloat = probabilities.iter().sum();
    if sum > governing_sum + distribution::EPSILON {
        error::invariant_violation(&Error::SumExceeded {
            sum,
            expected: governing_sum,
        });
        let scale = governing_sum / sum;
        probabilities.iter_mut().for_each(|p| *p *= scale);
    }
    Distribution::new(&probabilities, 0)
}

pub fn compute_departure_distribution(data: &DepartureData) -> Distribution {
    if let Some(observed) = data.is_message {
        return Distribution::one_point(cmp::max(observed - data.scheduled_departure, 0), data.train.sum());
    }

    let cut = cut_after_latest_feasible_arrival(&data.feeders);
    let probabilities = (0..=data.largest_delay())
        .map(|delay| {
            let t = data.scheduled_departure + delay;
            if delay == 0 {
                data.train.ready_at_schedule(data.scheduled_departure)
                    * departure_independent_from_feeders(&data.feeders, t)
            } else if delay <= data.maximum_waiting_time {
                data.train.ready_at(data.scheduled_departure, t) * departure_independent_from_feeders(&data.feeders, t)
                    + data.train.ready_before(data.scheduled_departure, t) * had_to_wait_for_feeders(&data.feeders, &cut, t)
            } else {
                data.train.ready_at(data.scheduled_departure, t)
            }
        })
        .collect();
    finish(probabilities, data.train.sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn independent_of_one_feeder() {
        let d = Distribution::new(&[0.4, 0.3, 0.2, 0.1], 0);
        let feeders = vec![FeederInfo::new(&d, 13, 17, 5, 3)];
        assert_eq!(feeders[0].latest_feasible_arrival, 15);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 21), 1.0, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 20), 1.0, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 19), 0.8, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 18), 0.5, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 17), 0.1, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 16), 0.1, 1e-6);
    }

    #[test]
    fn independent_of_two_feeders() {
        let d1 = Distribution::new(&[0.4, 0.3, 0.2, 0.1], 0);
        let d2 = Distribution::new(&[0.1, 0.5, 0.3, 0.1], -1);
        let feeders = vec![FeederInfo::new(&d1, 13, 17, 5, 3), FeederInfo::new(&d2, 14, 17, 5, 4)];
        assert_eq!(feeders[1].latest_feasible_arrival, 16);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 21), 1.0, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 20), 0.9, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 19), 0.48, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 18), 0.05, 1e-6);
        assert_float_absolute_eq!(departure_independent_from_feeders(&feeders, 17), 0.0, 1e-6);
    }

    #[test]
    fn had_to_wait() {
        let d1 = Distribution::new(&[0.1, 0.5, 0.3, 0.1], -1);
        let d2 = Distribution::new(&[0.1, 0.5, 0.3, 0.1], 0);
        // lfa 12 and 13
        let feeders = vec![FeederInfo::new(&d1, 11, 15, 5, 2), FeederInfo::new(&d2, 11, 15, 5, 3)];
        let cut = cut_after_latest_feasible_arrival(&feeders);
        assert_float_absolute_eq!(had_to_wait_for_feeders(&feeders, &cut, 16), 0.12, 1e-6);
        assert_float_absolute_eq!(had_to_wait_for_feeders(&feeders, &cut, 17), 0.56, 1e-6);
        assert_float_absolute_eq!(had_to_wait_for_feeders(&feeders, &cut, 18), 0.3, 1e-6);
        assert_float_absolute_eq!(had_to_wait_for_feeders(&feeders, &cut, 19), 0.0, 1e-6);

        let feeders = vec![FeederInfo::new(&d1, 11, 15, 5, 2), FeederInfo::new(&d2, 11, 15, 4, 2)];
        let cut = cut_after_latest_feasible_arrival(&feeders);
        assert_float_absolute_eq!(had_to_wait_for_feeders(&feeders, &cut, 16), 0.45, 1e-6);
        assert_float_absolute_eq!(had_to_wait_for_feeders(&feeders, &cut, 17), 0.51, 1e-6);
        assert_float_absolute_eq!(had_to_wait_for_feeders(&feeders, &cut, 18), 0.0, 1e-6);
        assert_float_absolute_eq!(had_to_wait_for_feeders(&feeders, &cut, 19), 0.0, 1e-6);
    }

    /// Probability that the latest feasible feeder, shifted by its transfer time, is ready
    /// exactly at `t`, enumerated over all delay combinations.
    fn had_to_wait_brute_force(feeders: &[FeederInfo], t: Mtime) -> MFloat {
        let mut combinations: Vec<(Vec<Mtime>, MFloat)> = vec![(vec![], 1.0)];
        for f in feeders {
            let mut next = vec![];
            for (delays, p) in &combinations {
                for delay in f.distribution.first_minute()..=f.distribution.last_minute() {
                    let mut delays = delays.clone();
                    delays.push(delay);
                    next.push((delays, p * f.distribution.probability_equal(delay)));
                }
            }
            combinations = next;
        }
        combinations
            .iter()
            .filter(|(delays, _)| {
                let ready = feeders
                    .iter()
                    .zip(delays)
                    .filter(|(f, d)| f.scheduled_arrival + **d <= f.latest_feasible_arrival)
                    .map(|(f, d)| f.scheduled_arrival + d + f.transfer_time)
                    .max();
                ready == Some(t)
            })
            .map(|(_, p)| p)
            .sum()
    }

    #[test]
    fn had_to_wait_matches_enumeration() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let distributions: Vec<Distribution> = (0..rng.gen_range(1..=3))
                .map(|_| {
                    let raw: Vec<MFloat> = (0..rng.gen_range(1..6)).map(|_| rng.gen_range(0.0..1.0)).collect();
                    let total: MFloat = raw.iter().sum();
                    let normalized: Vec<MFloat> = raw.iter().map(|p| p / total).collect();
                    Distribution::new(&normalized, rng.gen_range(-1..3))
                })
                .collect();
            let departure = 30;
            let feeders: Vec<FeederInfo> = distributions
                .iter()
                .map(|d| FeederInfo::new(d, rng.gen_range(22..27), departure, rng.gen_range(2..5), rng.gen_range(1..6)))
                .collect();
            let cut = cut_after_latest_feasible_arrival(&feeders);
            for t in departure + 1..departure + 8 {
                assert_float_absolute_eq!(
                    had_to_wait_for_feeders(&feeders, &cut, t),
                    had_to_wait_brute_force(&feeders, t),
                    1e-9
                );
            }
        }
    }

    #[test]
    fn first_stop_without_feeders() {
        let start = Distribution::new(&[0.6, 0.4], 0);
        let data = DepartureData::new(10, TrainInfo::Start { distribution: &start }, vec![], None);
        assert_eq!(data.largest_delay(), 1);
        assert_eq!(compute_departure_distribution(&data), start);
    }

    #[test]
    fn start_before_schedule() {
        let early = Distribution::new(&[0.5, 0.5], -3);
        let data = DepartureData::new(10, TrainInfo::Start { distribution: &early }, vec![], None);
        assert_eq!(data.largest_delay(), 0);
        let d = compute_departure_distribution(&data);
        assert!(d.exists());
        assert_eq!(d, Distribution::one_point(0, 1.0));
    }

    #[test]
    fn first_stop_with_feeder() {
        let start = Distribution::new(&[0.6, 0.4], 0);
        let feeder = Distribution::new(&[0.1, 0.4, 0.1, 0.1, 0.1, 0.1, 0.1], -1);
        // arrives 5 minutes before departure, transfer 5, waits up to 3 minutes
        let data = DepartureData::new(
            10,
            TrainInfo::Start { distribution: &start },
            vec![FeederInfo::new(&feeder, 5, 10, 5, 3)],
            None,
        );
        assert_eq!(data.largest_delay(), 3);
        let d = compute_departure_distribution(&data);
        assert_eq!(d, Distribution::new(&[0.42, 0.38, 0.1, 0.1], 0));
        assert_float_absolute_eq!(d.sum(), 1.0, 1e-6);
    }

    #[test]
    fn preceding_arrival_without_feeders() {
        let arrival = Distribution::new(&[0.1, 0.7, 0.2], -1);
        let data = DepartureData::new(
            10,
            TrainInfo::Preceding { distribution: &arrival, scheduled_arrival: 8, min_standing: 2 },
            vec![],
            None,
        );
        assert_eq!(compute_departure_distribution(&data), Distribution::new(&[0.8, 0.2], 0));
    }

    #[test]
    fn two_feeders_with_same_shape() {
        let mut values = vec![0.043];
        values.extend(std::iter::repeat(0.033).take(29));
        let shape = Distribution::new(&values, 0);
        let data = DepartureData::new(
            371,
            TrainInfo::Preceding { distribution: &shape, scheduled_arrival: 365, min_standing: 2 },
            vec![FeederInfo::new(&shape, 341, 371, 5, 3), FeederInfo::new(&shape, 356, 371, 5, 3)],
            None,
        );
        assert_eq!(data.largest_delay(), 25);
        let d = compute_departure_distribution(&data);
        assert_eq!(d.first_minute(), 0);
        assert_eq!(d.last_minute(), 25);
        assert_float_absolute_eq!(d.probability_equal(0), 0.142065175, 1e-6);
        assert_float_absolute_eq!(d.probability_equal(1), 0.039384873, 1e-6);
        assert_float_absolute_eq!(d.probability_equal(2), 0.043906401, 1e-6);
        assert_float_absolute_eq!(d.probability_equal(3), 0.048643551, 1e-6);
        for m in 4..=25 {
            assert_float_absolute_eq!(d.probability_equal(m), 0.033, 1e-6);
        }
        assert_float_absolute_eq!(d.sum(), 1.0, 1e-6);
    }

    #[test]
    fn is_message_overrides() {
        let arrival = Distribution::new(&[0.2, 0.3], 0);
        let mut data = DepartureData::new(
            10,
            TrainInfo::Preceding { distribution: &arrival, scheduled_arrival: 8, min_standing: 2 },
            vec![],
            Some(14),
        );
        let d = compute_departure_distribution(&data);
        assert_eq!(d.first_minute(), 4);
        assert_eq!(d.last_minute(), 4);
        assert_float_absolute_eq!(d.sum(), 0.5, 1e-6);

        data.is_message = Some(7);
        assert_eq!(compute_departure_distribution(&data).first_minute(), 0);
    }
}
