use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::computation::Context;
use crate::config::Config;
use crate::delay_model::StartAndTravelDistributions;
use crate::distribution::Distribution;
use crate::distribution_store::{EventKey, Store};
use crate::error::Result;
use crate::timetable::{EventLocation, Timetable};
use crate::types::{self, Mtime};

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueElement {
    scheduled_departure: Mtime,
    train_id: u32,
    edge_idx: usize,
    conn_idx: usize,
}

/// Earliest departure first, ties by descending train id.
impl Ord for QueueElement {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_departure
            .cmp(&self.scheduled_departure)
            .then_with(|| self.train_id.cmp(&other.train_id))
            .then_with(|| other.edge_idx.cmp(&self.edge_idx))
            .then_with(|| other.conn_idx.cmp(&self.conn_idx))
    }
}

impl PartialOrd for QueueElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PrecomputationReport {
    pub seeded_routes: usize,
    pub processed: usize,
    pub already_computed: usize,
    pub errors: usize,
}

fn enqueue_edge(timetable: &Timetable, queue: &mut BinaryHeap<QueueElement>, edge_idx: usize) {
    for (conn_idx, c) in timetable.route_edges[edge_idx].connections.iter().enumerate() {
        queue.push(QueueElement {
            scheduled_departure: c.departure.scheduled,
            train_id: c.train_id,
            edge_idx,
            conn_idx,
        });
    }
}

/// Writes both distributions of one connection and records what they depend on.
fn store_element(
    store: &mut Store,
    departure_key: &EventKey,
    departure: Distribution,
    predecessors: &[EventKey],
    arrival_key: &EventKey,
    arrival: Distribution,
) {
    let predecessor_nodes: Vec<usize> = predecessors.iter().filter_map(|k| store.node_idx(k)).collect();
    let departure_node = store.get_or_insert(departure_key);
    store.set_distribution(departure_node, departure);
    store.relink_predecessors(departure_node, &predecessor_nodes);
    let arrival_node = store.get_or_insert(arrival_key);
    store.set_distribution(arrival_node, arrival);
    store.relink_predecessors(arrival_node, &[departure_node]);
}

fn compute_element(ctx: &Context, element: &QueueElement) -> Result<(Distribution, Vec<EventKey>, Distribution)> {
    let (departure, predecessors) = ctx.departure_distribution(element.edge_idx, element.conn_idx)?;
    let arrival = {
        let data = ctx.arrival_data(element.edge_idx, element.conn_idx, &departure);
        crate::computation::compute_arrival_distribution(&data)
    };
    Ok((departure, predecessors, arrival))
}

/// Computes the departure and arrival distributions of every trip on a route that other
/// trains wait for, in order of scheduled departure so that every feeder is computed before
/// the departures waiting for it.
pub fn perform_precomputation(
    timetable: &Timetable,
    s_t_distributions: &dyn StartAndTravelDistributions,
    config: &Config,
    store: &mut Store,
) -> PrecomputationReport {
    let start = Instant::now();
    let mut report = PrecomputationReport::default();
    let mut queue = BinaryHeap::new();
    for edge_idx in timetable.first_edges() {
        let route = &timetable.routes[timetable.route_edges[edge_idx].route_idx];
        if timetable.waiting_time_rules.other_trains_wait_for(&route.category) {
            enqueue_edge(timetable, &mut queue, edge_idx);
            report.seeded_routes += 1;
        }
    }
    info!("precomputing distributions for {} routes", report.seeded_routes);

    while let Some(element) = queue.pop() {
        let departure_key = timetable.event_key(&EventLocation::departure(element.edge_idx, element.conn_idx));
        let arrival_key = timetable.event_key(&EventLocation::arrival(element.edge_idx, element.conn_idx));

        if store.contains(&departure_key) || store.contains(&arrival_key) {
            warn!("distribution already computed: {}", departure_key);
            report.already_computed += 1;
            continue;
        }

        // every connection of the edge is queued, the next edge only once
        if element.conn_idx == 0 {
            if let Some(next) = timetable.next_edge(element.edge_idx) {
                enqueue_edge(timetable, &mut queue, next);
            }
        }

        let computed = {
            let ctx = Context::new(timetable, &*store, s_t_distributions, config);
            compute_element(&ctx, &element)
        };
        match computed {
            Ok((departure, predecessors, arrival)) => {
                debug!(
                    "{} departs {} {}",
                    departure_key,
                    types::format_time(element.scheduled_departure),
                    departure
                );
                store_element(store, &departure_key, departure, &predecessors, &arrival_key, arrival);
                report.processed += 1;
            }
            Err(e) => {
                warn!("could not compute {}: {}", departure_key, e);
                report.errors += 1;
            }
        }
    }
    info!(
        "precomputed {} connections in {:?} ({} already computed, {} errors)",
        report.processed,
        start.elapsed(),
        report.already_computed,
        report.errors
    );
    report
}
