use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::connection::{Connection, Footpath, Route, Station, StopInfo, TimestampReason};
use crate::distribution_store::{EventKey, EventKind};
use crate::error::{Error, Result};
use crate::types::Mtime;

/// Stop of one route at one station.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RouteNode {
    pub station_idx: usize,
    pub route_idx: usize,
    pub incoming_edge: Option<usize>,
    pub outgoing_edge: Option<usize>,
}

/// Connections between two consecutive route nodes, ordered by departure. The connection at
/// index `i` belongs to the same trip on every edge of a route.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RouteEdge {
    pub route_idx: usize,
    pub from_node: usize,
    pub to_node: usize,
    pub connections: Vec<Connection>,
}

/// Minutes a departing train of one category waits for a delayed feeder of another category.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WaitingTimeRules {
    /// feeder category -> departing category -> minutes
    waiting_times: FxHashMap<String, FxHashMap<String, u16>>,
}

impl WaitingTimeRules {
    pub fn new() -> WaitingTimeRules {
        WaitingTimeRules::default()
    }

    pub fn add_rule(&mut self, feeder_category: &str, departing_category: &str, minutes: u16) {
        self.waiting_times
            .entry(feeder_category.to_lowercase())
            .or_default()
            .insert(departing_category.to_lowercase(), minutes);
    }

    pub fn waiting_time(&self, feeder_category: &str, departing_category: &str) -> u16 {
        self.waiting_times
            .get(feeder_category)
            .and_then(|w| w.get(departing_category))
            .copied()
            .unwrap_or(0)
    }

    pub fn other_trains_wait_for(&self, category: &str) -> bool {
        self.waiting_times
            .get(category)
            .map_or(false, |w| w.values().any(|m| *m > 0))
    }

    fn lowercase_categories(&mut self) {
        let rules = std::mem::take(&mut self.waiting_times);
        for (feeder, departing) in rules {
            for (departing, minutes) in departing {
                self.add_rule(&feeder, &departing, minutes);
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventLocation {
    pub edge_idx: usize,
    pub conn_idx: usize,
    pub kind: EventKind,
}

impl EventLocation {
    pub fn departure(edge_idx: usize, conn_idx: usize) -> EventLocation {
        EventLocation { edge_idx, conn_idx, kind: EventKind::Departure }
    }

    pub fn arrival(edge_idx: usize, conn_idx: usize) -> EventLocation {
        EventLocation { edge_idx, conn_idx, kind: EventKind::Arrival }
    }
}

/// Arrival that a departure may wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeederCandidate {
    pub arrival: EventLocation,
    pub transfer_time: Mtime,
    pub waiting_time: Mtime,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Timetable {
    pub stations: Vec<Station>,
    pub routes: Vec<Route>,
    pub route_nodes: Vec<RouteNode>,
    pub route_edges: Vec<RouteEdge>,
    pub waiting_time_rules: WaitingTimeRules,
}

impl Timetable {
    pub fn load(path: &str) -> Result<Timetable> {
        let buf = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        Timetable::from_json(&buf)
    }

    /// Parses a serialized timetable. Categories are compared in lowercase.
    pub fn from_json(buf: &[u8]) -> Result<Timetable> {
        let mut tt: Timetable = serde_json::from_slice(buf)?;
        for route in &mut tt.routes {
            route.category = route.category.to_lowercase();
        }
        for c in tt.route_edges.iter_mut().flat_map(|e| e.connections.iter_mut()) {
            c.category = c.category.to_lowercase();
        }
        tt.waiting_time_rules.lowercase_categories();
        Ok(tt)
    }

    pub fn connection(&self, edge_idx: usize, conn_idx: usize) -> &Connection {
        &self.route_edges[edge_idx].connections[conn_idx]
    }

    pub fn stop_info(&self, location: &EventLocation) -> &StopInfo {
        let c = self.connection(location.edge_idx, location.conn_idx);
        match location.kind {
            EventKind::Departure => &c.departure,
            EventKind::Arrival => &c.arrival,
        }
    }

    fn stop_info_mut(&mut self, location: &EventLocation) -> &mut StopInfo {
        let c = &mut self.route_edges[location.edge_idx].connections[location.conn_idx];
        match location.kind {
            EventKind::Departure => &mut c.departure,
            EventKind::Arrival => &mut c.arrival,
        }
    }

    pub fn station_of(&self, location: &EventLocation) -> usize {
        let edge = &self.route_edges[location.edge_idx];
        match location.kind {
            EventKind::Departure => self.route_nodes[edge.from_node].station_idx,
            EventKind::Arrival => self.route_nodes[edge.to_node].station_idx,
        }
    }

    pub fn event_key(&self, location: &EventLocation) -> EventKey {
        let c = self.connection(location.edge_idx, location.conn_idx);
        EventKey::new(
            c.train_id,
            &c.category,
            &c.line_identifier,
            self.station_of(location),
            location.kind,
            self.stop_info(location).scheduled,
        )
    }

    /// Arrival of the same trip at the station where `edge_idx` departs.
    pub fn preceding_arrival(&self, edge_idx: usize, conn_idx: usize) -> Option<EventLocation> {
        self.route_nodes[self.route_edges[edge_idx].from_node]
            .incoming_edge
            .map(|e| EventLocation::arrival(e, conn_idx))
    }

    pub fn next_edge(&self, edge_idx: usize) -> Option<usize> {
        self.route_nodes[self.route_edges[edge_idx].to_node].outgoing_edge
    }

    pub fn first_edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.routes.iter().filter_map(|r| r.edges.first().copied())
    }

    /// Arrivals at the departure station that the departure at (`edge_idx`, `conn_idx`)
    /// waits for.
    pub fn potential_feeders(&self, edge_idx: usize, conn_idx: usize, feeder_lookback: Mtime) -> Vec<FeederCandidate> {
        let edge = &self.route_edges[edge_idx];
        let departing = &edge.connections[conn_idx];
        let station = &self.stations[self.route_nodes[edge.from_node].station_idx];
        let transfer_time = station.transfer_time as Mtime;
        let departure = departing.departure.scheduled;
        let mut feeders = vec![];
        for rn in &station.route_nodes {
            let node = &self.route_nodes[*rn];
            if node.route_idx == edge.route_idx {
                continue;
            }
            let incoming = match node.incoming_edge {
                Some(e) => e,
                None => continue,
            };
            for (i, c) in self.route_edges[incoming].connections.iter().enumerate() {
                let arrival = c.arrival.scheduled;
                if !c.arrival.in_out_allowed
                    || arrival < departure - feeder_lookback
                    || arrival > departure - transfer_time
                {
                    continue;
                }
                let waiting_time = self.waiting_time_rules.waiting_time(&c.category, &departing.category);
                if waiting_time == 0 {
                    continue;
                }
                feeders.push(FeederCandidate {
                    arrival: EventLocation::arrival(incoming, i),
                    transfer_time,
                    waiting_time: waiting_time as Mtime,
                });
            }
        }
        feeders
    }

    pub fn transfer_time(&self, station_idx: usize) -> Result<Mtime> {
        self.stations
            .get(station_idx)
            .map(|s| s.transfer_time as Mtime)
            .ok_or(Error::UnknownStation(station_idx))
    }

    pub fn walking_duration(&self, from_station_idx: usize, to_station_idx: usize) -> Result<Option<Mtime>> {
        let station = self
            .stations
            .get(from_station_idx)
            .ok_or(Error::UnknownStation(from_station_idx))?;
        Ok(station.walking_duration(to_station_idx).map(|d| d as Mtime))
    }

    pub fn find_event(&self, train_id: u32, station_idx: usize, kind: EventKind, scheduled_time: Mtime) -> Result<EventLocation> {
        let not_found = Error::ConnectionNotFound {
            train_id,
            station_idx,
            kind,
            scheduled_time,
        };
        let station = match self.stations.get(station_idx) {
            Some(s) => s,
            None => return Err(not_found),
        };
        for rn in &station.route_nodes {
            let node = &self.route_nodes[*rn];
            let edge_idx = match kind {
                EventKind::Departure => node.outgoing_edge,
                EventKind::Arrival => node.incoming_edge,
            };
            let edge_idx = match edge_idx {
                Some(e) => e,
                None => continue,
            };
            let found = self.route_edges[edge_idx].connections.iter().position(|c| {
                let stop = match kind {
                    EventKind::Departure => &c.departure,
                    EventKind::Arrival => &c.arrival,
                };
                c.train_id == train_id && stop.scheduled == scheduled_time
            });
            if let Some(conn_idx) = found {
                return Ok(EventLocation { edge_idx, conn_idx, kind });
            }
        }
        Err(not_found)
    }

    pub fn find_by_key(&self, key: &EventKey) -> Result<EventLocation> {
        self.find_event(key.train_id, key.station_idx, key.kind, key.scheduled_time)
    }

    /// Records a new event time; returns false if a more authoritative time is already known.
    pub fn apply_delay(&mut self, location: &EventLocation, time: Mtime, reason: TimestampReason) -> bool {
        self.stop_info_mut(location).update(time, reason)
    }

    pub fn cancel(&mut self, location: &EventLocation) {
        self.stop_info_mut(location).in_out_allowed = false;
    }
}

struct PendingTrip {
    route_idx: usize,
    train_id: u32,
    line_identifier: String,
    /// (arrival, departure) per stop of the route
    times: Vec<(Mtime, Mtime)>,
}

/// Assembles a `Timetable` from stations, routes and trips.
#[derive(Default)]
pub struct TimetableBuilder {
    timetable: Timetable,
    trips: Vec<PendingTrip>,
}

impl TimetableBuilder {
    pub fn new() -> TimetableBuilder {
        TimetableBuilder::default()
    }

    pub fn add_station(&mut self, id: &str, name: &str, transfer_time: u16) -> usize {
        self.timetable
            .stations
            .push(Station::new(id.to_owned(), name.to_owned(), transfer_time));
        self.timetable.stations.len() - 1
    }

    pub fn add_footpath(&mut self, from_station_idx: usize, to_station_idx: usize, duration: u16) -> Result<()> {
        if to_station_idx >= self.timetable.stations.len() {
            return Err(Error::UnknownStation(to_station_idx));
        }
        let station = self
            .timetable
            .stations
            .get_mut(from_station_idx)
            .ok_or(Error::UnknownStation(from_station_idx))?;
        station.footpaths.push(Footpath {
            target_station_idx: to_station_idx,
            duration,
        });
        Ok(())
    }

    pub fn add_waiting_time(&mut self, feeder_category: &str, departing_category: &str, minutes: u16) {
        self.timetable
            .waiting_time_rules
            .add_rule(feeder_category, departing_category, minutes);
    }

    pub fn add_route(&mut self, id: &str, name: &str, category: &str, stations: &[usize]) -> Result<usize> {
        if stations.len() < 2 {
            return Err(Error::InvalidTrip(format!("route {} needs at least two stops", id)));
        }
        if let Some(s) = stations.iter().find(|s| **s >= self.timetable.stations.len()) {
            return Err(Error::UnknownStation(*s));
        }
        let tt = &mut self.timetable;
        let route_idx = tt.routes.len();
        let mut route = Route::new(id.to_owned(), name.to_owned(), category.to_lowercase());
        for s in stations {
            let node_idx = tt.route_nodes.len();
            tt.route_nodes.push(RouteNode {
                station_idx: *s,
                route_idx,
                incoming_edge: None,
                outgoing_edge: None,
            });
            tt.stations[*s].route_nodes.push(node_idx);
            route.nodes.push(node_idx);
        }
        for pair in route.nodes.windows(2) {
            let edge_idx = tt.route_edges.len();
            tt.route_edges.push(RouteEdge {
                route_idx,
                from_node: pair[0],
                to_node: pair[1],
                connections: vec![],
            });
            tt.route_nodes[pair[0]].outgoing_edge = Some(edge_idx);
            tt.route_nodes[pair[1]].incoming_edge = Some(edge_idx);
            route.edges.push(edge_idx);
        }
        tt.routes.push(route);
        Ok(route_idx)
    }

    /// `times` holds (arrival, departure) for every stop of the route; the arrival at the
    /// first and the departure at the last stop are ignored.
    pub fn add_trip(&mut self, route_idx: usize, train_id: u32, line_identifier: &str, times: &[(Mtime, Mtime)]) -> Result<()> {
        let route = self
            .timetable
            .routes
            .get(route_idx)
            .ok_or_else(|| Error::InvalidTrip(format!("route {} does not exist", route_idx)))?;
        if times.len() != route.nodes.len() {
            return Err(Error::InvalidTrip(format!(
                "train {} has {} stops, route {} has {}",
                train_id,
                times.len(),
                route.id,
                route.nodes.len()
            )));
        }
        for (i, pair) in times.windows(2).enumerate() {
            if pair[0].1 > pair[1].0 || (i > 0 && pair[0].0 > pair[0].1) {
                return Err(Error::InvalidTrip(format!("train {} travels back in time", train_id)));
            }
        }
        self.trips.push(PendingTrip {
            route_idx,
            train_id,
            line_identifier: line_identifier.to_owned(),
            times: times.to_vec(),
        });
        Ok(())
    }

    pub fn build(mut self) -> Timetable {
        self.trips.sort_by(|a, b| {
            a.route_idx
                .cmp(&b.route_idx)
                .then(a.times[0].1.cmp(&b.times[0].1))
                .then(a.train_id.cmp(&b.train_id))
        });
        let mut tt = self.timetable;
        let mut trip_counts: Vec<usize> = vec![0; tt.routes.len()];
        for trip in self.trips {
            let route = &tt.routes[trip.route_idx];
            let trip_idx = trip_counts[trip.route_idx];
            trip_counts[trip.route_idx] += 1;
            for (i, edge_idx) in route.edges.iter().enumerate() {
                let c = Connection::new(
                    trip.train_id,
                    &route.category,
                    &trip.line_identifier,
                    trip_idx,
                    trip.times[i].1,
                    trip.times[i + 1].0,
                );
                tt.route_edges[*edge_idx].connections.push(c);
            }
        }
        tt
    }
}
