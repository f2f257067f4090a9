use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::types::{self, Mtime, NodeIdx};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Departure,
    Arrival,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Departure => write!(f, "departure"),
            EventKind::Arrival => write!(f, "arrival"),
        }
    }
}

/// Identifies one event independently of realtime changes; `scheduled_time` is never updated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub train_id: u32,
    category: String,
    pub line_identifier: String,
    pub station_idx: usize,
    pub kind: EventKind,
    pub scheduled_time: Mtime,
}

impl EventKey {
    pub fn new(
        train_id: u32,
        category: &str,
        line_identifier: &str,
        station_idx: usize,
        kind: EventKind,
        scheduled_time: Mtime,
    ) -> EventKey {
        EventKey {
            train_id,
            category: category.to_lowercase(),
            line_identifier: line_identifier.to_owned(),
            station_idx,
            kind,
            scheduled_time,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} at station {} {}",
            self.category,
            self.train_id,
            self.kind,
            self.station_idx,
            types::format_time(self.scheduled_time)
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DistributionNode {
    pub key: EventKey,
    pub distribution: Distribution,
    pub predecessors: Vec<NodeIdx>,
    pub successors: Vec<NodeIdx>,
    pub retired: bool,
}

/// Read access to event distributions.
pub trait DistributionLookup {
    fn get_distribution(&self, key: &EventKey) -> Option<&Distribution>;
}

/// Arena of distribution graph nodes. Node indices stay valid for the lifetime of the store;
/// retired nodes keep their slot.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Store {
    nodes: Vec<DistributionNode>,
    #[serde(skip)]
    index: FxHashMap<EventKey, NodeIdx>,
}

impl Store {
    pub fn new() -> Store {
        Store {
            nodes: vec![],
            index: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn node_idx(&self, key: &EventKey) -> Option<NodeIdx> {
        self.index.get(key).copied()
    }

    pub fn node(&self, idx: NodeIdx) -> &DistributionNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &DistributionNode)> {
        self.nodes.iter().enumerate().filter(|(_, n)| !n.retired)
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get_or_insert(&mut self, key: &EventKey) -> NodeIdx {
        if let Some(idx) = self.index.get(key) {
            return *idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(DistributionNode {
            key: key.clone(),
            distribution: Distribution::empty(),
            predecessors: vec![],
            successors: vec![],
            retired: false,
        });
        self.index.insert(key.clone(), idx);
        idx
    }

    /// Replaces the distribution of `idx` and returns the previous one.
    pub fn set_distribution(&mut self, idx: NodeIdx, distribution: Distribution) -> Distribution {
        std::mem::replace(&mut self.nodes[idx].distribution, distribution)
    }

    pub fn link(&mut self, predecessor: NodeIdx, successor: NodeIdx) {
        if !self.nodes[predecessor].successors.contains(&successor) {
            self.nodes[predecessor].successors.push(successor);
        }
        if !self.nodes[successor].predecessors.contains(&predecessor) {
            self.nodes[successor].predecessors.push(predecessor);
        }
    }

    fn unlink(&mut self, predecessor: NodeIdx, successor: NodeIdx) {
        self.nodes[predecessor].successors.retain(|s| *s != successor);
        self.nodes[successor].predecessors.retain(|p| *p != predecessor);
    }

    /// Replaces the predecessor set of `idx`, e.g. after the feeders of a departure changed.
    pub fn relink_predecessors(&mut self, idx: NodeIdx, predecessors: &[NodeIdx]) {
        let old = std::mem::take(&mut self.nodes[idx].predecessors);
        for p in old {
            self.nodes[p].successors.retain(|s| *s != idx);
        }
        for p in predecessors {
            self.link(*p, idx);
        }
    }

    /// Removes the node from the graph and returns its former successors.
    pub fn retire(&mut self, idx: NodeIdx) -> Vec<NodeIdx> {
        let successors = self.nodes[idx].successors.clone();
        let predecessors = self.nodes[idx].predecessors.clone();
        for s in &successors {
            self.unlink(idx, *s);
        }
        for p in predecessors {
            self.unlink(p, idx);
        }
        let node = &mut self.nodes[idx];
        node.distribution = Distribution::empty();
        node.retired = true;
        let key = node.key.clone();
        self.index.remove(&key);
        successors
    }

    /// Restores the key index, e.g. after deserialization.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.retired)
            .map(|(i, n)| (n.key.clone(), i))
            .collect();
    }
}

impl DistributionLookup for Store {
    fn get_distribution(&self, key: &EventKey) -> Option<&Distribution> {
        self.node_idx(key)
            .map(|idx| &self.nodes[idx].distribution)
            .filter(|d| d.exists())
    }
}

/// Lookup answering every key with one distribution.
pub struct SingleDistribution<'a> {
    pub distribution: &'a Distribution,
}

impl<'a> DistributionLookup for SingleDistribution<'a> {
    fn get_distribution(&self, _key: &EventKey) -> Option<&Distribution> {
        Some(self.distribution)
    }
}

/// Distributions computed along one ride, falling back to `base` for everything else.
pub struct RideDistributions<'a> {
    base: &'a dyn DistributionLookup,
    local: FxHashMap<EventKey, Distribution>,
}

impl<'a> RideDistributions<'a> {
    pub fn new(base: &'a dyn DistributionLookup) -> RideDistributions<'a> {
        RideDistributions {
            base,
            local: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, key: EventKey, distribution: Distribution) {
        self.local.insert(key, distribution);
    }
}

impl<'a> DistributionLookup for RideDistributions<'a> {
    fn get_distribution(&self, key: &EventKey) -> Option<&Distribution> {
        match self.local.get(key) {
            Some(d) => Some(d),
            None => self.base.get_distribution(key),
        }
    }
}
