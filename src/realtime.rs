use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::computation::Context;
use crate::config::Config;
use crate::connection::TimestampReason;
use crate::delay_model::StartAndTravelDistributions;
use crate::distribution::Distribution;
use crate::distribution_store::{EventKey, EventKind, Store};
use crate::error::{Error, Result};
use crate::timetable::{EventLocation, Timetable};
use crate::types::{self, Mtime, NodeIdx};

/// A new time for one timetable event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DelayEvent {
    pub train_id: u32,
    pub station_idx: usize,
    pub kind: EventKind,
    pub scheduled_time: Mtime,
    pub current_time: Mtime,
    pub reason: TimestampReason,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventRef {
    pub train_id: u32,
    pub station_idx: usize,
    pub kind: EventKind,
    pub scheduled_time: Mtime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeMessage {
    Delay(DelayEvent),
    /// Also used for reroutes: the dropped stops are cancelled.
    Cancel { events: Vec<EventRef> },
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub significant: usize,
    pub not_significant: usize,
    pub already_updated: usize,
    pub errors: usize,
    pub not_precomputed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Queued,
    Processed,
}

/// Departures sort before arrivals at the same scheduled time.
type QueueEntry = Reverse<(Mtime, EventKind, u32, NodeIdx)>;

struct UpdateQueue {
    heap: BinaryHeap<QueueEntry>,
    states: FxHashMap<NodeIdx, NodeState>,
    wavefront: Mtime,
}

impl UpdateQueue {
    fn new() -> UpdateQueue {
        UpdateQueue {
            heap: BinaryHeap::new(),
            states: FxHashMap::default(),
            wavefront: Mtime::MIN,
        }
    }

    fn push(&mut self, store: &Store, idx: NodeIdx) {
        let key = &store.node(idx).key;
        self.heap.push(Reverse((key.scheduled_time, key.kind, key.train_id, idx)));
        self.states.entry(idx).or_insert(NodeState::Queued);
    }

    /// Next node to recompute; `Err` carries a node that was already processed in the
    /// current wavefront of equal scheduled times.
    fn pop(&mut self) -> Option<std::result::Result<NodeIdx, NodeIdx>> {
        let Reverse((time, _, _, idx)) = self.heap.pop()?;
        if time > self.wavefront {
            self.wavefront = time;
            self.states.retain(|_, s| *s == NodeState::Queued);
        }
        match self.states.insert(idx, NodeState::Processed) {
            Some(NodeState::Processed) => Some(Err(idx)),
            _ => Some(Ok(idx)),
        }
    }
}

pub fn load_messages(path: &str) -> Result<Vec<RealtimeMessage>> {
    let buf = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(serde_json::from_slice(&buf)?)
}

fn find(timetable: &Timetable, train_id: u32, station_idx: usize, kind: EventKind, scheduled_time: Mtime) -> Option<EventLocation> {
    match timetable.find_event(train_id, station_idx, kind, scheduled_time) {
        Ok(location) => Some(location),
        Err(e) => {
            warn!("ignoring realtime message: {}", e);
            None
        }
    }
}

fn recompute(ctx: &Context, store: &Store, location: &EventLocation) -> Result<(Distribution, Vec<NodeIdx>)> {
    match location.kind {
        EventKind::Departure => {
            let (d, predecessors) = ctx.departure_distribution(location.edge_idx, location.conn_idx)?;
            Ok((d, node_indices(store, &predecessors)))
        }
        EventKind::Arrival => {
            let (d, departure_key) = ctx.arrival_distribution(location.edge_idx, location.conn_idx)?;
            let departure = store
                .node_idx(&departure_key)
                .ok_or(Error::MissingDistribution(departure_key))?;
            Ok((d, vec![departure]))
        }
    }
}

fn node_indices(store: &Store, keys: &[EventKey]) -> Vec<NodeIdx> {
    keys.iter().filter_map(|k| store.node_idx(k)).collect()
}

/// Applies a batch of realtime messages to the timetable and propagates the resulting
/// changes through the precomputed distributions.
///
/// Only reports with reason `Is` trigger recomputation; forecasts and propagated times are
/// recorded in the timetable. A recomputed node whose distribution moved by more than
/// `config.significance_threshold` (sum of absolute differences) passes the update on to its
/// successors.
pub fn apply_realtime_batch(
    timetable: &mut Timetable,
    s_t_distributions: &dyn StartAndTravelDistributions,
    config: &Config,
    store: &mut Store,
    messages: &[RealtimeMessage],
) -> BatchReport {
    let start = Instant::now();
    let mut report = BatchReport::default();
    let mut reported: Vec<NodeIdx> = vec![];
    let mut orphaned: IndexSet<NodeIdx> = IndexSet::new();

    for message in messages {
        match message {
            RealtimeMessage::Delay(event) => {
                let location = match find(timetable, event.train_id, event.station_idx, event.kind, event.scheduled_time) {
                    Some(l) => l,
                    None => {
                        report.errors += 1;
                        continue;
                    }
                };
                if !timetable.apply_delay(&location, event.current_time, event.reason) {
                    debug!("outdated {:?} time for train {} ignored", event.reason, event.train_id);
                    continue;
                }
                if event.reason != TimestampReason::Is {
                    continue;
                }
                match store.node_idx(&timetable.event_key(&location)) {
                    Some(idx) => reported.push(idx),
                    None => report.not_precomputed += 1,
                }
            }
            RealtimeMessage::Cancel { events } => {
                for e in events {
                    let location = match find(timetable, e.train_id, e.station_idx, e.kind, e.scheduled_time) {
                        Some(l) => l,
                        None => {
                            report.errors += 1;
                            continue;
                        }
                    };
                    timetable.cancel(&location);
                    report.cancelled += 1;
                    if let Some(idx) = store.node_idx(&timetable.event_key(&location)) {
                        orphaned.extend(store.retire(idx));
                    }
                }
            }
        }
    }

    let mut queue = UpdateQueue::new();
    for idx in orphaned.into_iter().chain(reported) {
        if !store.node(idx).retired {
            queue.push(store, idx);
        }
    }

    while let Some(popped) = queue.pop() {
        let idx = match popped {
            Ok(idx) => idx,
            Err(idx) => {
                debug!("{} already updated", store.node(idx).key);
                report.already_updated += 1;
                continue;
            }
        };
        if store.node(idx).retired {
            continue;
        }
        let key = store.node(idx).key.clone();
        let location = match timetable.find_by_key(&key) {
            Ok(l) => l,
            Err(e) => {
                warn!("could not update {}: {}", key, e);
                report.errors += 1;
                continue;
            }
        };
        if !timetable.stop_info(&location).in_out_allowed {
            for s in store.retire(idx) {
                queue.push(store, s);
            }
            continue;
        }

        let computed = {
            let ctx = Context::new(timetable, &*store, s_t_distributions, config);
            recompute(&ctx, store, &location)
        };
        let (after, predecessors) = match computed {
            Ok(c) => c,
            Err(e) => {
                warn!("could not update {}: {}", key, e);
                report.errors += 1;
                continue;
            }
        };
        store.relink_predecessors(idx, &predecessors);
        let difference = store.node(idx).distribution.difference(&after);
        store.set_distribution(idx, after);
        report.processed += 1;

        if difference > config.significance_threshold {
            debug!("{} at {} changed by {}", key, types::format_time(key.scheduled_time), difference);
            report.significant += 1;
            let successors = store.node(idx).successors.clone();
            for s in successors {
                queue.push(store, s);
            }
        } else {
            report.not_significant += 1;
        }
    }

    info!(
        "realtime batch of {} messages done in {:?}: {} processed, {} significant, {} not significant, {} already updated, {} errors, {} not precomputed, {} cancelled",
        messages.len(),
        start.elapsed(),
        report.processed,
        report.significant,
        report.not_significant,
        report.already_updated,
        report.errors,
        report.not_precomputed,
        report.cancelled
    );
    report
}
