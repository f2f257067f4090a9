use std::cmp;

use crate::computation::departure::{self, DepartureData};
use crate::distribution::Distribution;
use crate::types::{MFloat, Mtime};

/// The connecting train a traveller actually boards from.
#[derive(Debug, Clone, Copy)]
pub struct InterchangeFeederInfo<'a> {
    pub distribution: &'a Distribution,
    pub scheduled_arrival: Mtime,
    pub transfer_time: Mtime,
    pub waiting_time: Mtime,
    pub latest_feasible_arrival: Mtime,
}

impl<'a> InterchangeFeederInfo<'a> {
    pub fn new(distribution: &'a Distribution, scheduled_arrival: Mtime, scheduled_departure: Mtime, transfer_time: Mtime, waiting_time: Mtime) -> InterchangeFeederInfo<'a> {
        debug_assert!(distribution.exists());
        InterchangeFeederInfo {
            distribution,
            scheduled_arrival,
            transfer_time,
            waiting_time,
            latest_feasible_arrival: scheduled_departure - transfer_time + waiting_time,
        }
    }

    /// Interchange between different stations: the walk replaces the transfer time and
    /// nobody waits.
    pub fn walk(distribution: &'a Distribution, scheduled_arrival: Mtime, scheduled_departure: Mtime, walking_duration: Mtime) -> InterchangeFeederInfo<'a> {
        InterchangeFeederInfo::new(distribution, scheduled_arrival, scheduled_departure, walking_duration, 0)
    }

    fn arrived(&self, t: Mtime) -> MFloat {
        self.distribution
            .probability_smaller_equal(t - self.transfer_time - self.scheduled_arrival)
    }

    fn arrives_at(&self, t: Mtime) -> MFloat {
        self.distribution
            .probability_equal(t - self.transfer_time - self.scheduled_arrival)
    }
}

#[derive(Debug, Clone)]
pub struct InterchangeData<'a> {
    /// Departure data whose feeders exclude the interchange feeder.
    pub departure: DepartureData<'a>,
    pub interchange_feeder: InterchangeFeederInfo<'a>,
}

impl<'a> InterchangeData<'a> {
    pub fn new(mut departure: DepartureData<'a>, interchange_feeder: InterchangeFeederInfo<'a>) -> InterchangeData<'a> {
        departure.maximum_waiting_time = cmp::max(departure.maximum_waiting_time, interchange_feeder.waiting_time);
        InterchangeData {
            departure,
            interchange_feeder,
        }
    }
}

/// Departure distribution conditioned on catching the train, i.e. mass only where the
/// interchange feeder arrived in time. The sum is at most the feeder's sum.
pub fn compute_departure_distribution_interchange(data: &InterchangeData) -> Distribution {
    let dep = &data.departure;
    let ic = &data.interchange_feeder;
    if let Some(observed) = dep.is_message {
        return Distribution::one_point(cmp::max(observed - dep.scheduled_departure, 0), ic.distribution.sum());
    }

    let cut = departure::cut_after_latest_feasible_arrival(&dep.feeders);
    let probabilities = (0..=dep.largest_delay())
        .map(|delay| {
            let t = dep.scheduled_departure + delay;
            if delay == 0 {
                ic.arrived(t)
                    * dep.train.ready_at_schedule(dep.scheduled_departure)
                    * departure::departure_independent_from_feeders(&dep.feeders, t)
            } else if delay <= dep.maximum_waiting_time {
                let independent = departure::departure_independent_from_feeders(&dep.feeders, t);
                let had_to_wait = departure::had_to_wait_for_feeders(&dep.feeders, &cut, t);
                let ic_arrived = ic.arrived(t);
                let mut waiting = had_to_wait * ic_arrived;
                if t - ic.transfer_time <= ic.latest_feasible_arrival {
                    waiting += ic.arrives_at(t) * (independent - had_to_wait);
                }
                dep.train.ready_at(dep.scheduled_departure, t) * independent * ic_arrived
                    + dep.train.ready_before(dep.scheduled_departure, t) * waiting
            } else {
                ic.arrived(t) * dep.train.ready_at(dep.scheduled_departure, t)
            }
        })
        .collect();
    departure::finish(probabilities, ic.distribution.sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::departure::{FeederInfo, TrainInfo};

    #[test]
    fn ic_feeder_arrived_and_at() {
        let pd = Distribution::new(&[0.1; 8], 0);
        let ic = InterchangeFeederInfo::new(&pd, 0, 6, 4, 3);
        assert_eq!(ic.latest_feasible_arrival, 5);
        for i in 0..8 {
            assert_float_absolute_eq!(ic.arrived(4 + i), (i + 1) as MFloat * 0.1, 1e-6);
            assert_float_absolute_eq!(ic.arrives_at(4 + i), 0.1, 1e-6);
        }
    }

    #[test]
    fn first_stop_reliable_interchange() {
        let start = Distribution::new(&[0.6, 0.4], 0);
        let arrival = Distribution::new(&[0.1, 0.7, 0.2], -1);
        let departure = DepartureData::new(610, TrainInfo::Start { distribution: &start }, vec![], None);
        let data = InterchangeData::new(departure, InterchangeFeederInfo::new(&arrival, 600, 610, 5, 0));
        let d = compute_departure_distribution_interchange(&data);
        assert_eq!(d.first_minute(), 0);
        assert_eq!(d.last_minute(), 1);
        assert_float_absolute_eq!(d.sum(), 1.0, 1e-6);
        assert_float_absolute_eq!(d.probability_equal(0), 0.6, 1e-6);
        assert_float_absolute_eq!(d.probability_equal(1), 0.4, 1e-6);
    }

    #[test]
    fn first_stop_unreliable_interchange() {
        let start = Distribution::new(&[0.6, 0.4], 0);
        let arrival = Distribution::new(&[0.05, 0.05, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.3], -1);
        let departure = DepartureData::new(610, TrainInfo::Start { distribution: &start }, vec![], None);
        let data = InterchangeData::new(departure, InterchangeFeederInfo::new(&arrival, 600, 610, 5, 0));
        let d = compute_departure_distribution_interchange(&data);
        assert_eq!(d.first_minute(), 0);
        assert_eq!(d.last_minute(), 1);
        assert_float_absolute_eq!(d.probability_equal(0), 0.6 * 0.6, 1e-6);
        assert_float_absolute_eq!(d.probability_equal(1), 0.4 * 0.7, 1e-6);
    }

    #[test]
    fn preceding_arrival_no_waiting() {
        let preceding = Distribution::new(&[0.9, 0.1], 3);
        let arrival = Distribution::new(&[0.4, 0.3, 0.2, 0.1], 14);
        let departure = DepartureData::new(
            620,
            TrainInfo::Preceding { distribution: &preceding, scheduled_arrival: 615, min_standing: 2 },
            vec![],
            None,
        );
        let data = InterchangeData::new(departure, InterchangeFeederInfo::new(&arrival, 600, 620, 5, 0));
        let d = compute_departure_distribution_interchange(&data);
        assert_eq!(d.first_minute(), 0);
        assert_eq!(d.last_minute(), 1);
        assert_float_absolute_eq!(d.probability_equal(0), 0.9 * 0.7, 1e-6);
        assert_float_absolute_eq!(d.probability_equal(1), 0.1 * 0.9, 1e-6);
    }

    #[test]
    fn waiting_for_interchange_and_other_feeder() {
        let start = Distribution::new(&[0.6, 0.4], 0);
        let arrival = Distribution::new(&[0.4, 0.3, 0.2, 0.1], 16);
        let other = Distribution::new(&[0.9, 0.05, 0.05], 12);
        let departure = DepartureData::new(
            692,
            TrainInfo::Start { distribution: &start },
            vec![FeederInfo::new(&other, 675, 692, 5, 3)],
            None,
        );
        assert_eq!(departure.feeders[0].latest_feasible_arrival, 690);
        let data = InterchangeData::new(departure, InterchangeFeederInfo::new(&arrival, 670, 692, 5, 3));
        assert_eq!(data.departure.maximum_waiting_time, 3);
        let d = compute_departure_distribution_interchange(&data);
        assert_eq!(d.first_minute(), 0);
        assert_eq!(d.last_minute(), 2);
        assert_float_absolute_eq!(d.probability_equal(0), 0.6 * 0.9 * 0.7, 1e-6);
        let waits_at_1 = 0.4 * 0.95 * 0.9 + 0.6 * 0.05 * 0.2 + 0.6 * 0.9 * 0.2 + 0.6 * 0.05 * 0.7;
        assert_float_absolute_eq!(d.probability_equal(1), waits_at_1, 1e-6);
        let waits_at_2 = 0.05 * 0.1 + 0.95 * 0.1 + 0.05 * 0.9;
        assert_float_absolute_eq!(d.probability_equal(2), waits_at_2, 1e-6);
    }

    #[test]
    fn walk_loses_late_arrivals() {
        let start = Distribution::one_point(0, 1.0);
        let arrival = Distribution::new(&[0.5, 0.5], 0);
        let departure = DepartureData::new(20, TrainInfo::Start { distribution: &start }, vec![], None);
        // 10 + 1 + 10 > 20: the late half misses the train
        let data = InterchangeData::new(departure, InterchangeFeederInfo::walk(&arrival, 10, 20, 10));
        assert_eq!(data.interchange_feeder.waiting_time, 0);
        let d = compute_departure_distribution_interchange(&data);
        assert_float_absolute_eq!(d.sum(), 0.5, 1e-6);
        assert_float_absolute_eq!(d.probability_equal(0), 0.5, 1e-6);
    }

    #[test]
    fn is_message_uses_interchange_sum() {
        let start = Distribution::one_point(0, 1.0);
        let arrival = Distribution::new(&[0.5, 0.3], 0);
        let departure = DepartureData::new(20, TrainInfo::Start { distribution: &start }, vec![], Some(23));
        let data = InterchangeData::new(departure, InterchangeFeederInfo::new(&arrival, 10, 20, 5, 0));
        let d = compute_departure_distribution_interchange(&data);
        assert_eq!(d.first_minute(), 3);
        assert_float_absolute_eq!(d.sum(), 0.8, 1e-6);
    }
}
