//! Module defining the per-router link-state database and the graph queries
//! built on top of it.

use crate::packet::LinkEntry;
use crate::{LinkAttrs, LinkId, LinkWeight, RouterId, Topology};
use petgraph::algo::{astar, min_spanning_tree};
use petgraph::data::Element;
use petgraph::visit::{EdgeFiltered, EdgeRef};
use std::collections::{HashMap, HashSet};

/// The most recently accepted advertisement of one origin.
#[derive(Debug, Clone)]
pub struct Lsa {
    pub seq: u64,
    pub entries: Vec<LinkEntry>,
}

/// Per-router store of the latest advertisement per origin, plus the
/// topology graph derived from them.
///
/// Invariant: the graph edges are the union of the latest accepted
/// advertisement from every known origin, except that the direct edges to
/// physical neighbors are always retained.
#[derive(Debug)]
pub struct LinkStateDatabase {
    router_id: RouterId,
    accepted: HashMap<RouterId, Lsa>,
    graph: Topology,
}

impl LinkStateDatabase {
    pub fn new(router_id: RouterId) -> Self {
        let mut graph = Topology::new();
        graph.add_node(router_id);
        Self {
            router_id,
            accepted: HashMap::new(),
            graph,
        }
    }

    /// Record a physical adjacency. Direct edges survive every merge.
    pub fn add_direct_edge(&mut self, neighbor: RouterId, cost: LinkWeight) {
        self.graph.add_node(neighbor);
        self.graph
            .add_edge(self.router_id, neighbor, LinkAttrs { cost, active: true });
    }

    /// Merge a full link-state dump into the database.
    ///
    /// The advertisement is accepted only if no entry for this origin exists
    /// yet, or the stored sequence id is strictly smaller. On accept, all of
    /// the origin's previous edges are replaced by the advertised ones; the
    /// direct edge between the local router and the origin (if any) is
    /// preserved with its recorded attributes. Entries pointing back at the
    /// local router are skipped.
    ///
    /// Returns whether the advertisement was new, which drives reflooding.
    pub fn merge(&mut self, origin: RouterId, seq: u64, entries: &[LinkEntry]) -> bool {
        if let Some(existing) = self.accepted.get(&origin) {
            if existing.seq >= seq {
                return false;
            }
        }
        self.accepted.insert(
            origin,
            Lsa {
                seq,
                entries: entries.to_vec(),
            },
        );

        if self.graph.contains_node(origin) {
            let direct = self.graph.edge_weight(self.router_id, origin).copied();
            self.graph.remove_node(origin);
            self.graph.add_node(origin);
            if let Some(attrs) = direct {
                self.graph.add_edge(self.router_id, origin, attrs);
            }
        }
        for entry in entries {
            if entry.router_id == self.router_id {
                continue;
            }
            self.graph.add_node(entry.router_id);
            self.graph.add_edge(
                origin,
                entry.router_id,
                LinkAttrs {
                    cost: entry.cost,
                    active: true,
                },
            );
        }
        true
    }

    /// Latest accepted sequence id for an origin
    pub fn accepted_seq(&self, origin: RouterId) -> Option<u64> {
        self.accepted.get(&origin).map(|lsa| lsa.seq)
    }

    pub fn graph(&self) -> &Topology {
        &self.graph
    }

    /// Replace the derived graph with a topology snapshot pushed by the
    /// network monitor.
    pub fn sync(&mut self, snapshot: Topology) {
        self.graph = snapshot;
        self.graph.add_node(self.router_id);
    }

    /// Full cost-shortest path from the local router to `target`.
    pub fn shortest_path(&self, target: RouterId) -> Option<Vec<RouterId>> {
        shortest_path(&self.graph, self.router_id, target)
    }
}

/// Cost-shortest path over the active edges of a topology.
pub fn shortest_path(topo: &Topology, from: RouterId, to: RouterId) -> Option<Vec<RouterId>> {
    if !topo.contains_node(from) || !topo.contains_node(to) {
        return None;
    }
    let active = EdgeFiltered::from_fn(topo, |e| e.weight().active);
    astar(&active, from, |n| n == to, |e| e.weight().cost, |_| 0.0).map(|(_, path)| path)
}

/// The set of links forming a minimum spanning tree (by cost) of the
/// topology. Disconnected topologies yield a spanning forest.
pub fn minimum_spanning_tree_links(topo: &Topology) -> HashSet<LinkId> {
    let mut nodes: Vec<RouterId> = Vec::new();
    let mut links = HashSet::new();
    for element in min_spanning_tree(topo) {
        match element {
            Element::Node { weight } => nodes.push(weight),
            Element::Edge { source, target, .. } => {
                links.insert(LinkId::new(nodes[source], nodes[target]));
            }
        }
    }
    links
}
