// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The weighted topology graph and shortest-path computation.
//!
//! Vertices are live switch and adapter IDs. Switch→switch edges are
//! directional from the prober's measurements; adapter↔switch edges are
//! added symmetrically from the adapter's measurements. A missing latency
//! measurement means no edge.

use crate::gateway::AdapterEntry;
use crate::router::SwitchEntry;
use patchbay::error::Error;
use patchbay::wire::Throughput;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::time::Duration;

/// The scalar cost of one link.
///
/// Heterogeneous on purpose, for compatibility with the deployed weight
/// scheme: nanoseconds of latency plus milliseconds of read and write
/// time. Swapping the formula here changes path selection everywhere.
pub fn edge_weight(latency: Duration, throughput: &Throughput) -> u64 {
    latency.as_nanos().min(u64::MAX as u128) as u64
        + throughput.read.as_millis() as u64
        + throughput.write.as_millis() as u64
}

/// A directed weighted graph over string IDs with deterministic
/// iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adj: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, id: &str) {
        self.adj.entry(id.to_string()).or_default();
    }

    /// Add a directed edge. Both endpoints must already be vertices.
    pub fn add_edge(&mut self, from: &str, to: &str, weight: u64) -> Result<(), Error> {
        if !self.adj.contains_key(from) || !self.adj.contains_key(to) {
            return Err(Error::PeerNotFound);
        }

        if let Some(edges) = self.adj.get_mut(from) {
            edges.insert(to.to_string(), weight);
        }

        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adj.contains_key(id)
    }

    pub fn vertex_count(&self) -> usize {
        self.adj.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adj.values().map(|edges| edges.len()).sum()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &String> {
        self.adj.keys()
    }

    /// Dijkstra over the edge weights.
    ///
    /// `dst-is-src` when the endpoints coincide; `route-not-found` when
    /// either endpoint is unknown or nothing connects them.
    pub fn shortest_path(&self, src: &str, dst: &str) -> Result<Vec<String>, Error> {
        if src == dst {
            return Err(Error::DstIsSrc);
        }
        if !self.contains(src) || !self.contains(dst) {
            return Err(Error::RouteNotFound);
        }

        let mut dist: HashMap<&str, u64> = HashMap::new();
        let mut prev: HashMap<&str, &str> = HashMap::new();
        let mut heap: BinaryHeap<Reverse<(u64, &str)>> = BinaryHeap::new();

        dist.insert(src, 0);
        heap.push(Reverse((0, src)));

        while let Some(Reverse((cost, vertex))) = heap.pop() {
            if vertex == dst {
                break;
            }
            if cost > *dist.get(vertex).unwrap_or(&u64::MAX) {
                continue;
            }

            if let Some(edges) = self.adj.get(vertex) {
                for (next, weight) in edges {
                    let candidate = cost.saturating_add(*weight);
                    if candidate < *dist.get(next.as_str()).unwrap_or(&u64::MAX) {
                        dist.insert(next.as_str(), candidate);
                        prev.insert(next.as_str(), vertex);
                        heap.push(Reverse((candidate, next.as_str())));
                    }
                }
            }
        }

        if !dist.contains_key(dst) {
            return Err(Error::RouteNotFound);
        }

        let mut path = vec![dst.to_string()];
        let mut cursor = dst;
        while let Some(previous) = prev.get(cursor) {
            path.push(previous.to_string());
            cursor = previous;
        }

        if path.last().map(String::as_str) != Some(src) {
            return Err(Error::RouteNotFound);
        }

        path.reverse();
        Ok(path)
    }
}

/// Build the topology graph from registry snapshots.
///
/// A pure function of its inputs: equal registries yield equal graphs.
pub fn network_graph(
    switches: &HashMap<String, SwitchEntry>,
    adapters: &HashMap<String, AdapterEntry>,
) -> Graph {
    let mut graph = Graph::new();

    let mut switch_ids: Vec<&String> = switches.keys().collect();
    switch_ids.sort();

    for id in &switch_ids {
        graph.add_vertex(id);
    }

    for from in &switch_ids {
        let entry = &switches[*from];
        for to in &switch_ids {
            if from == to {
                continue;
            }

            let (Some(latency), Some(throughput)) =
                (entry.latencies.get(*to), entry.throughputs.get(*to))
            else {
                continue;
            };

            let _ = graph.add_edge(from, to, edge_weight(*latency, throughput));
        }
    }

    let mut adapter_ids: Vec<&String> = adapters.keys().collect();
    adapter_ids.sort();

    for id in &adapter_ids {
        graph.add_vertex(id);

        let entry = &adapters[*id];
        for (switch_id, latency) in &entry.latencies {
            let throughput = entry.throughputs.get(switch_id).copied().unwrap_or_default();
            let weight = edge_weight(*latency, &throughput);

            // Measurements against switches that died since are skipped.
            let _ = graph.add_edge(switch_id, id, weight);
            let _ = graph.add_edge(id, switch_id, weight);
        }
    }

    graph
}
