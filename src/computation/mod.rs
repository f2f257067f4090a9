pub mod arrival;
pub mod departure;
pub mod interchange;

use std::cmp;

use tracing::debug;

use crate::config::Config;
use crate::delay_model::StartAndTravelDistributions;
use crate::distribution::Distribution;
use crate::distribution_store::{DistributionLookup, EventKey};
use crate::error::{Error, Result};
use crate::timetable::{EventLocation, Timetable};
use crate::types::Mtime;

pub use arrival::{compute_arrival_distribution, ArrivalData};
pub use departure::{compute_departure_distribution, DepartureData, FeederInfo, TrainInfo};
pub use interchange::{compute_departure_distribution_interchange, InterchangeData, InterchangeFeederInfo};

/// Everything the engines read while building their input data.
pub struct Context<'a> {
    pub timetable: &'a Timetable,
    pub distributions: &'a dyn DistributionLookup,
    pub s_t_distributions: &'a dyn StartAndTravelDistributions,
    pub config: &'a Config,
}

impl<'a> Context<'a> {
    pub fn new(
        timetable: &'a Timetable,
        distributions: &'a dyn DistributionLookup,
        s_t_distributions: &'a dyn StartAndTravelDistributions,
        config: &'a Config,
    ) -> Context<'a> {
        Context {
            timetable,
            distributions,
            s_t_distributions,
            config,
        }
    }

    fn train_info(&self, edge_idx: usize, conn_idx: usize, predecessors: &mut Vec<EventKey>) -> Result<TrainInfo<'a>> {
        let tt = self.timetable;
        let c = tt.connection(edge_idx, conn_idx);
        match tt.preceding_arrival(edge_idx, conn_idx) {
            None => Ok(TrainInfo::Start {
                distribution: self.s_t_distributions.start_distribution(&c.category),
            }),
            Some(location) => {
                let key = tt.event_key(&location);
                let distribution = self
                    .distributions
                    .get_distribution(&key)
                    .ok_or_else(|| Error::MissingDistribution(key.clone()))?;
                let scheduled_arrival = tt.stop_info(&location).scheduled;
                predecessors.push(key);
                Ok(TrainInfo::Preceding {
                    distribution,
                    scheduled_arrival,
                    min_standing: cmp::min(self.config.max_standing_time, c.departure.scheduled - scheduled_arrival),
                })
            }
        }
    }

    fn feeder_infos(&self, edge_idx: usize, conn_idx: usize, except: Option<EventLocation>, predecessors: &mut Vec<EventKey>) -> Vec<FeederInfo<'a>> {
        let tt = self.timetable;
        let scheduled_departure = tt.connection(edge_idx, conn_idx).departure.scheduled;
        let mut feeders = vec![];
        for candidate in tt.potential_feeders(edge_idx, conn_idx, self.config.feeder_lookback) {
            if Some(candidate.arrival) == except {
                continue;
            }
            let key = tt.event_key(&candidate.arrival);
            match self.distributions.get_distribution(&key) {
                Some(distribution) => {
                    feeders.push(FeederInfo::new(
                        distribution,
                        key.scheduled_time,
                        scheduled_departure,
                        candidate.transfer_time,
                        candidate.waiting_time,
                    ));
                    predecessors.push(key);
                }
                None => debug!("no distribution for feeder {}, ignoring it", key),
            }
        }
        feeders
    }

    /// Input of the departure engine together with the keys of the events it depends on.
    pub fn departure_data(&self, edge_idx: usize, conn_idx: usize) -> Result<(DepartureData<'a>, Vec<EventKey>)> {
        let mut predecessors = vec![];
        let train = self.train_info(edge_idx, conn_idx, &mut predecessors)?;
        let feeders = self.feeder_infos(edge_idx, conn_idx, None, &mut predecessors);
        let departure = &self.timetable.connection(edge_idx, conn_idx).departure;
        Ok((
            DepartureData::new(departure.scheduled, train, feeders, departure.is_time()),
            predecessors,
        ))
    }

    /// Departure data of a traveller changing from the arrival `feeder` with distribution
    /// `feeder_distribution` into the departure (`edge_idx`, `conn_idx`).
    pub fn interchange_data(
        &self,
        feeder: &EventLocation,
        feeder_distribution: &'a Distribution,
        edge_idx: usize,
        conn_idx: usize,
    ) -> Result<InterchangeData<'a>> {
        let tt = self.timetable;
        let mut predecessors = vec![];
        let train = self.train_info(edge_idx, conn_idx, &mut predecessors)?;
        let departing = tt.connection(edge_idx, conn_idx);
        let arriving = tt.connection(feeder.edge_idx, feeder.conn_idx);
        let scheduled_departure = departing.departure.scheduled;
        let scheduled_arrival = arriving.arrival.scheduled;
        let from_station = tt.station_of(feeder);
        let to_station = tt.station_of(&EventLocation::departure(edge_idx, conn_idx));

        let (feeders, interchange_feeder) = if from_station == to_station {
            let waiting_time = tt.waiting_time_rules.waiting_time(&arriving.category, &departing.category);
            (
                self.feeder_infos(edge_idx, conn_idx, Some(*feeder), &mut predecessors),
                InterchangeFeederInfo::new(
                    feeder_distribution,
                    scheduled_arrival,
                    scheduled_departure,
                    tt.transfer_time(to_station)?,
                    waiting_time as Mtime,
                ),
            )
        } else {
            let walk = tt
                .walking_duration(from_station, to_station)?
                .ok_or(Error::InvalidJourney("no footpath between interchange stations"))?;
            (
                self.feeder_infos(edge_idx, conn_idx, None, &mut predecessors),
                InterchangeFeederInfo::walk(feeder_distribution, scheduled_arrival, scheduled_departure, walk),
            )
        };
        let departure = DepartureData::new(scheduled_departure, train, feeders, departing.departure.is_time());
        Ok(InterchangeData::new(departure, interchange_feeder))
    }

    pub fn arrival_data(&self, edge_idx: usize, conn_idx: usize, departure: &'a Distribution) -> ArrivalData<'a> {
        let c = self.timetable.connection(edge_idx, conn_idx);
        ArrivalData {
            scheduled_arrival: c.arrival.scheduled,
            departure,
            travel_distributions: self.s_t_distributions.travel_time_distributions(
                &c.category,
                c.travel_time(),
                cmp::max(departure.last_minute(), 0),
            ),
            is_message: c.arrival.is_time(),
        }
    }

    /// Departure distribution of (`edge_idx`, `conn_idx`) and the keys it was computed from.
    pub fn departure_distribution(&self, edge_idx: usize, conn_idx: usize) -> Result<(Distribution, Vec<EventKey>)> {
        let (data, predecessors) = self.departure_data(edge_idx, conn_idx)?;
        Ok((compute_departure_distribution(&data), predecessors))
    }

    /// Arrival distribution of (`edge_idx`, `conn_idx`) from the stored departure distribution.
    pub fn arrival_distribution(&self, edge_idx: usize, conn_idx: usize) -> Result<(Distribution, EventKey)> {
        let key = self.timetable.event_key(&EventLocation::departure(edge_idx, conn_idx));
        let departure = self
            .distributions
            .get_distribution(&key)
            .ok_or_else(|| Error::MissingDistribution(key.clone()))?;
        let data = self.arrival_data(edge_idx, conn_idx, departure);
        Ok((compute_arrival_distribution(&data), key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay_model::ConstantDistributions;
    use crate::distribution_store::{EventKind, Store};
    use crate::timetable::TimetableBuilder;

    /// ICE 1 A->B->C, RB 7 X->B->Y with the ICE arriving at B at 20 and RB leaving B at 27.
    fn setup() -> Timetable {
        let mut b = TimetableBuilder::new();
        let a = b.add_station("a", "A", 2);
        let s_b = b.add_station("b", "B", 3);
        let c = b.add_station("c", "C", 2);
        let x = b.add_station("x", "X", 2);
        let y = b.add_station("y", "Y", 2);
        b.add_footpath(c, y, 4).unwrap();
        b.add_waiting_time("ICE", "RB", 5);
        let ice = b.add_route("r1", "ICE 1", "ICE", &[a, s_b, c]).unwrap();
        let rb = b.add_route("r2", "RB 7", "RB", &[x, s_b, y]).unwrap();
        b.add_trip(ice, 1, "", &[(0, 10), (20, 22), (40, 40)]).unwrap();
        b.add_trip(rb, 7, "7", &[(0, 15), (25, 27), (50, 50)]).unwrap();
        b.build()
    }

    #[test]
    fn departure_data_with_feeder() {
        let tt = setup();
        let config = Config::default();
        let s_t = ConstantDistributions::default();
        let mut store = Store::new();
        let ice_arrival = store.get_or_insert(&tt.event_key(&EventLocation::arrival(0, 0)));
        store.set_distribution(ice_arrival, Distribution::new(&[0.5, 0.5], 0));
        let rb_arrival = store.get_or_insert(&tt.event_key(&EventLocation::arrival(2, 0)));
        store.set_distribution(rb_arrival, Distribution::new(&[1.0], 0));

        let ctx = Context::new(&tt, &store, &s_t, &config);
        let (data, predecessors) = ctx.departure_data(3, 0).unwrap();
        assert_eq!(data.scheduled_departure, 27);
        assert_eq!(data.feeders.len(), 1);
        assert_eq!(data.feeders[0].latest_feasible_arrival, 29);
        assert_eq!(data.maximum_waiting_time, 5);
        match data.train {
            TrainInfo::Preceding { scheduled_arrival, min_standing, .. } => {
                assert_eq!(scheduled_arrival, 25);
                assert_eq!(min_standing, 2);
            }
            TrainInfo::Start { .. } => panic!("expected preceding arrival"),
        }
        assert_eq!(predecessors.len(), 2);
        assert_eq!(predecessors[0].kind, EventKind::Arrival);
        assert_eq!(predecessors[1].train_id, 1);

        let (first, predecessors) = ctx.departure_data(0, 0).unwrap();
        assert!(matches!(first.train, TrainInfo::Start { .. }));
        assert!(predecessors.is_empty());
    }

    #[test]
    fn missing_preceding_arrival() {
        let tt = setup();
        let config = Config::default();
        let s_t = ConstantDistributions::default();
        let store = Store::new();
        let ctx = Context::new(&tt, &store, &s_t, &config);
        assert!(matches!(ctx.departure_data(1, 0), Err(Error::MissingDistribution(_))));
    }

    #[test]
    fn interchange_data() {
        let tt = setup();
        let config = Config::default();
        let s_t = ConstantDistributions::default();
        let mut store = Store::new();
        let rb_arrival = store.get_or_insert(&tt.event_key(&EventLocation::arrival(2, 0)));
        store.set_distribution(rb_arrival, Distribution::new(&[1.0], 0));
        let ice_arrival = Distribution::new(&[0.5, 0.5], 0);
        let ctx = Context::new(&tt, &store, &s_t, &config);

        let data = ctx.interchange_data(&EventLocation::arrival(0, 0), &ice_arrival, 3, 0).unwrap();
        assert!(data.departure.feeders.is_empty());
        assert_eq!(data.interchange_feeder.transfer_time, 3);
        assert_eq!(data.interchange_feeder.waiting_time, 5);
        assert_eq!(data.interchange_feeder.latest_feasible_arrival, 29);

        // no footpath from C to X
        assert!(ctx.interchange_data(&EventLocation::arrival(1, 0), &ice_arrival, 2, 0).is_err());
    }

    #[test]
    fn arrival_data() {
        let tt = setup();
        let config = Config::default();
        let s_t = ConstantDistributions::default();
        let store = Store::new();
        let ctx = Context::new(&tt, &store, &s_t, &config);
        let departure = Distribution::new(&[0.5, 0.5], 0);
        let data = ctx.arrival_data(0, 0, &departure);
        assert_eq!(data.scheduled_arrival, 20);
        assert_eq!(data.travel_distributions.as_ref().unwrap().len(), 2);
        assert!(data.is_message.is_none());
    }
}
