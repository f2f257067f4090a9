use serde::Serialize;
use tracing::debug;

use crate::computation::{compute_arrival_distribution, compute_departure_distribution_interchange, Context};
use crate::distribution::Distribution;
use crate::distribution_store::{DistributionLookup, EventKey, RideDistributions};
use crate::error::{Error, Result};
use crate::timetable::{EventLocation, Timetable};

/// Consecutive route edges travelled in one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub conn_idx: usize,
    pub edges: Vec<usize>,
}

impl Leg {
    /// The ride from `departure` to `arrival` of the same trip.
    pub fn from_events(timetable: &Timetable, departure: &EventLocation, arrival: &EventLocation) -> Result<Leg> {
        if departure.conn_idx != arrival.conn_idx {
            return Err(Error::InvalidJourney("leg changes trips"));
        }
        let mut edges = vec![departure.edge_idx];
        let mut edge_idx = departure.edge_idx;
        while edge_idx != arrival.edge_idx {
            edge_idx = timetable
                .next_edge(edge_idx)
                .ok_or(Error::InvalidJourney("arrival is not on the route of the departure"))?;
            edges.push(edge_idx);
        }
        Ok(Leg {
            conn_idx: departure.conn_idx,
            edges,
        })
    }

    fn first_departure(&self) -> EventLocation {
        EventLocation::departure(self.edges[0], self.conn_idx)
    }

    fn last_arrival(&self) -> EventLocation {
        EventLocation::arrival(self.edges[self.edges.len() - 1], self.conn_idx)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RatedEdge {
    pub departure_key: EventKey,
    pub departure: Distribution,
    pub arrival_key: EventKey,
    pub arrival: Distribution,
}

/// Distributions of the traveller's events. Later legs are conditioned on catching the
/// train, so their sums drop below 1 with every risky interchange.
#[derive(Serialize, Debug, Clone)]
pub struct ConnectionRating {
    pub legs: Vec<Vec<RatedEdge>>,
    pub arrival: Distribution,
}

fn view<'c>(ctx: &Context<'c>, distributions: &'c dyn DistributionLookup) -> Context<'c> {
    Context::new(ctx.timetable, distributions, ctx.s_t_distributions, ctx.config)
}

fn validate(timetable: &Timetable, legs: &[Leg]) -> Result<()> {
    if legs.is_empty() {
        return Err(Error::InvalidJourney("journey without legs"));
    }
    for leg in legs {
        if leg.edges.is_empty() {
            return Err(Error::InvalidJourney("leg without route edges"));
        }
        for edge_idx in &leg.edges {
            let edge = timetable
                .route_edges
                .get(*edge_idx)
                .ok_or(Error::UnknownRouteEdge(*edge_idx))?;
            if leg.conn_idx >= edge.connections.len() {
                return Err(Error::InvalidJourney("leg refers to a missing trip"));
            }
        }
        for pair in leg.edges.windows(2) {
            if timetable.next_edge(pair[0]) != Some(pair[1]) {
                return Err(Error::InvalidJourney("leg edges are not consecutive"));
            }
        }
    }
    Ok(())
}

/// Computes the trip's own distributions from its first route node up to `edge_idx`
/// (inclusive or not) wherever they are not known yet, e.g. for trips that were never
/// precomputed.
fn complete_trip(ctx: &Context, trip: &mut RideDistributions, edge_idx: usize, conn_idx: usize, inclusive: bool) -> Result<()> {
    let tt = ctx.timetable;
    let edges = &tt.routes[tt.route_edges[edge_idx].route_idx].edges;
    let pos = edges
        .iter()
        .position(|e| *e == edge_idx)
        .ok_or(Error::UnknownRouteEdge(edge_idx))?;
    let end = if inclusive { pos + 1 } else { pos };
    for e in &edges[..end] {
        let departure_key = tt.event_key(&EventLocation::departure(*e, conn_idx));
        if trip.get_distribution(&departure_key).is_none() {
            let (departure, _) = view(ctx, &*trip).departure_distribution(*e, conn_idx)?;
            debug!("ride-local {}: {}", departure_key, departure);
            trip.insert(departure_key, departure);
        }
        let arrival_key = tt.event_key(&EventLocation::arrival(*e, conn_idx));
        if trip.get_distribution(&arrival_key).is_none() {
            let (arrival, _) = view(ctx, &*trip).arrival_distribution(*e, conn_idx)?;
            trip.insert(arrival_key, arrival);
        }
    }
    Ok(())
}

/// Rates a journey: departure and arrival distributions of every edge the traveller rides
/// and the distribution of the final arrival.
///
/// The first leg uses the stored distributions of its trip. Every following leg starts with
/// an interchange departure fed by the previous leg's arrival, or simply continues the ride
/// when both legs belong to the same trip.
pub fn rate_connection(ctx: &Context, legs: &[Leg]) -> Result<ConnectionRating> {
    let tt = ctx.timetable;
    validate(tt, legs)?;
    let mut trip = RideDistributions::new(ctx.distributions);
    let mut rated_legs: Vec<Vec<RatedEdge>> = vec![];
    let mut previous: Option<(EventLocation, Distribution)> = None;

    for (i, leg) in legs.iter().enumerate() {
        let last_edge = leg.edges[leg.edges.len() - 1];
        let mut rated = vec![];
        if i == 0 {
            complete_trip(ctx, &mut trip, last_edge, leg.conn_idx, true)?;
            for edge_idx in &leg.edges {
                let departure_key = tt.event_key(&EventLocation::departure(*edge_idx, leg.conn_idx));
                let arrival_key = tt.event_key(&EventLocation::arrival(*edge_idx, leg.conn_idx));
                let departure = trip
                    .get_distribution(&departure_key)
                    .cloned()
                    .ok_or_else(|| Error::MissingDistribution(departure_key.clone()))?;
                let arrival = trip
                    .get_distribution(&arrival_key)
                    .cloned()
                    .ok_or_else(|| Error::MissingDistribution(arrival_key.clone()))?;
                rated.push(RatedEdge {
                    departure_key,
                    departure,
                    arrival_key,
                    arrival,
                });
            }
        } else {
            complete_trip(ctx, &mut trip, leg.edges[0], leg.conn_idx, false)?;
            let (feeder, feeder_arrival) = previous.as_ref().ok_or(Error::InvalidJourney("interchange without arrival"))?;
            let first = leg.first_departure();
            let stays_in_train = feeder.conn_idx == first.conn_idx && tt.next_edge(feeder.edge_idx) == Some(first.edge_idx);

            // the traveller's own arrival replaces the train's for the rest of the leg
            let mut ride = RideDistributions::new(&trip);
            let first_departure = if stays_in_train {
                ride.insert(tt.event_key(feeder), feeder_arrival.clone());
                view(ctx, &ride).departure_distribution(first.edge_idx, first.conn_idx)?.0
            } else {
                let data = view(ctx, &ride).interchange_data(feeder, feeder_arrival, first.edge_idx, first.conn_idx)?;
                compute_departure_distribution_interchange(&data)
            };
            let mut first_departure = Some(first_departure);
            for edge_idx in &leg.edges {
                let departure = match first_departure.take() {
                    Some(d) => d,
                    None => view(ctx, &ride).departure_distribution(*edge_idx, leg.conn_idx)?.0,
                };
                let arrival = compute_arrival_distribution(&view(ctx, &ride).arrival_data(*edge_idx, leg.conn_idx, &departure));
                let arrival_key = tt.event_key(&EventLocation::arrival(*edge_idx, leg.conn_idx));
                ride.insert(arrival_key.clone(), arrival.clone());
                rated.push(RatedEdge {
                    departure_key: tt.event_key(&EventLocation::departure(*edge_idx, leg.conn_idx)),
                    departure,
                    arrival_key,
                    arrival,
                });
            }
        }
        let arrival = rated
            .last()
            .map(|r| r.arrival.clone())
            .ok_or(Error::InvalidJourney("leg without route edges"))?;
        previous = Some((leg.last_arrival(), arrival));
        rated_legs.push(rated);
    }

    let arrival = previous.map(|(_, a)| a).unwrap_or_else(Distribution::empty);
    Ok(ConnectionRating {
        legs: rated_legs,
        arrival,
    })
}
