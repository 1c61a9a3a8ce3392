//! Module defining a router with OSPF link-state functionality and the
//! optional energy-saving behavior modules.
//!
//! There is a single `Router` type. The adaptive topology control (link
//! cut/graft) and the whole-router sleep control are composable modules
//! selected at construction through [`RouterConfig`].

use crate::event::{Event, EventQueue};
use crate::lsdb::{minimum_spanning_tree_links, shortest_path, LinkStateDatabase};
use crate::packet::{LinkEntry, LsaHeader, Packet, PacketKind};
use crate::{
    DeviceError, InterfaceStatus, LinkAttrs, LinkId, LinkWeight, NeighborState, RouterId, SimTime,
    Topology,
};
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet};

/// Throughput below this is considered no traffic at all.
const THROUGHPUT_EPSILON: f64 = 1e-5;

/// Parameters of the adaptive link cut/graft control.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveConfig {
    /// Utilization above which an inactive interface is grafted back
    pub upper_threshold: f64,
    /// Utilization below which a non-spanning-tree link is cut
    pub lower_threshold: f64,
    /// Time after a graft during which the interface cannot be cut again
    pub graft_cooldown: SimTime,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            upper_threshold: 0.8,
            lower_threshold: 0.2,
            graft_cooldown: 5.0,
        }
    }
}

/// Behavior modules of a router, selected at construction.
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub interfaces: usize,
    pub adaptive: Option<AdaptiveConfig>,
    pub sleep: bool,
}

impl RouterConfig {
    /// Plain OSPF router: LSDB, flooding and shortest-path forwarding
    pub fn ospf(interfaces: usize) -> Self {
        Self {
            interfaces,
            adaptive: None,
            sleep: false,
        }
    }

    /// OSPF router with adaptive link cut/graft control
    pub fn adaptive(interfaces: usize) -> Self {
        Self {
            interfaces,
            adaptive: Some(AdaptiveConfig::default()),
            sleep: false,
        }
    }

    /// OSPF router which sleeps when all interfaces are quiet
    pub fn eco(interfaces: usize) -> Self {
        Self {
            interfaces,
            adaptive: None,
            sleep: true,
        }
    }

    pub fn with_adaptive(mut self, config: AdaptiveConfig) -> Self {
        self.adaptive = Some(config);
        self
    }

    pub fn with_sleep(mut self) -> Self {
        self.sleep = true;
        self
    }
}

/// Instantaneous link state handed to a router by the monitor.
#[derive(Debug, Clone, Copy)]
pub struct LinkSample {
    pub active: bool,
    /// Bits sent in the current usage window
    pub throughput: u64,
    /// Usage as a proportion of the bandwidth
    pub rate: f64,
}

/// State of the adaptive link cut/graft control.
#[derive(Debug)]
struct AdaptiveControl {
    /// Interface-level activity mask, distinct from the link active flag
    iface_active: Vec<bool>,
    /// Topology snapshot pushed by the network, used for routing
    current_topo: Topology,
    /// Links forming the minimum spanning tree of the LSDB graph
    mcst: HashSet<LinkId>,
    /// Highest cut-update sequence seen per origin
    cut_seen: HashMap<RouterId, u64>,
    /// Highest graft-update sequence seen per origin
    graft_seen: HashMap<RouterId, u64>,
    upper_threshold: f64,
    lower_threshold: f64,
    /// Interface state swaps since the last sample
    switches: u64,
    /// Time of the last graft per interface, for the cut cooldown
    graft_time: Vec<Option<SimTime>>,
    graft_cooldown: SimTime,
}

/// State of the whole-router sleep control.
#[derive(Debug)]
struct SleepControl {
    awake: bool,
    switches: u64,
}

#[derive(Debug)]
pub struct Router {
    /// Name of the router
    name: &'static str,
    /// ID of the router
    router_id: RouterId,
    /// Fixed-size interface slots, each either empty or holding a link id
    links: Vec<Option<LinkId>>,
    interface_status: Vec<InterfaceStatus>,
    neighbor_states: Vec<NeighborState>,
    /// Adjacency rows advertised inside full link-state dumps
    link_entries: Vec<Option<LinkEntry>>,
    lsdb: LinkStateDatabase,
    /// Strictly increasing sequence id for originated advertisements
    lsa_seq: u64,
    /// Packets dropped because no next hop was found
    forwarding_failures: u64,
    adaptive: Option<AdaptiveControl>,
    sleep: Option<SleepControl>,
}

impl Router {
    pub fn new(name: &'static str, router_id: RouterId, config: RouterConfig) -> Self {
        let n = config.interfaces;
        Self {
            name,
            router_id,
            links: vec![None; n],
            interface_status: vec![InterfaceStatus::Sleep; n],
            neighbor_states: vec![NeighborState::Down; n],
            link_entries: vec![None; n],
            lsdb: LinkStateDatabase::new(router_id),
            lsa_seq: 0,
            forwarding_failures: 0,
            adaptive: config.adaptive.map(|c| AdaptiveControl {
                iface_active: vec![false; n],
                current_topo: Topology::new(),
                mcst: HashSet::new(),
                cut_seen: HashMap::new(),
                graft_seen: HashMap::new(),
                upper_threshold: c.upper_threshold,
                lower_threshold: c.lower_threshold,
                switches: 0,
                graft_time: vec![None; n],
                graft_cooldown: c.graft_cooldown,
            }),
            sleep: config.sleep.then(|| SleepControl {
                awake: true,
                switches: 0,
            }),
        }
    }

    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn lsdb(&self) -> &LinkStateDatabase {
        &self.lsdb
    }

    pub fn interfaces(&self) -> &[Option<LinkId>] {
        &self.links
    }

    pub fn interface_statuses(&self) -> &[InterfaceStatus] {
        &self.interface_status
    }

    pub fn neighbor_states(&self) -> &[NeighborState] {
        &self.neighbor_states
    }

    pub fn forwarding_failures(&self) -> u64 {
        self.forwarding_failures
    }

    /// Whether the interface is enabled by the adaptive mask. Routers
    /// without the adaptive module always answer true.
    pub fn interface_enabled(&self, iface: usize) -> bool {
        self.adaptive
            .as_ref()
            .map_or(true, |ad| ad.iface_active.get(iface).copied().unwrap_or(false))
    }

    /// Whether the router is awake. Routers without the sleep module never
    /// sleep.
    pub fn is_awake(&self) -> bool {
        self.sleep.as_ref().map_or(true, |s| s.awake)
    }

    pub fn has_sleep_control(&self) -> bool {
        self.sleep.is_some()
    }

    /// Bind a link to an interface slot. Immediately records a FULL
    /// neighbor, an ACTIVE interface, the direct LSDB edge and the link
    /// entry advertised to others.
    pub fn attach_link(
        &mut self,
        iface: usize,
        link_id: LinkId,
        neighbor: RouterId,
        cost: LinkWeight,
    ) -> Result<(), DeviceError> {
        if iface >= self.links.len() {
            return Err(DeviceError::InvalidInterface(iface));
        }
        if self.links[iface].is_some() {
            return Err(DeviceError::InterfaceOccupied(iface));
        }
        self.links[iface] = Some(link_id);
        self.neighbor_states[iface] = NeighborState::Full;
        self.interface_status[iface] = InterfaceStatus::Active;
        self.lsdb.add_direct_edge(neighbor, cost);
        self.link_entries[iface] = Some(LinkEntry {
            router_id: neighbor,
            link_id,
            cost,
        });
        if let Some(ad) = &mut self.adaptive {
            ad.iface_active[iface] = true;
        }
        Ok(())
    }

    /// Hand a packet to the link on the given interface. Non-blocking: the
    /// transfer is scheduled on the queue and executed later.
    pub fn send(
        &self,
        packet: Packet,
        iface: usize,
        now: SimTime,
        queue: &mut EventQueue,
    ) -> Result<(), DeviceError> {
        if iface >= self.links.len() {
            return Err(DeviceError::InvalidInterface(iface));
        }
        let link = self.links[iface].ok_or(DeviceError::InterfaceNotConnected(iface))?;
        queue.schedule(
            now,
            Event::Transmit {
                link,
                from: self.router_id,
                packet,
            },
        );
        Ok(())
    }

    /// Send a copy of the packet out of every connected interface which is
    /// not excluded.
    pub fn broadcast(
        &self,
        packet: &Packet,
        exclude: &[usize],
        now: SimTime,
        queue: &mut EventQueue,
    ) {
        for iface in 0..self.links.len() {
            if exclude.contains(&iface) || self.links[iface].is_none() {
                continue;
            }
            // infallible: the slot was just checked
            let _ = self.send(packet.clone(), iface, now, queue);
        }
    }

    /// Originate a data packet towards a target router. Sending to oneself
    /// is a no-op.
    pub fn send_to_router(
        &mut self,
        target: RouterId,
        length: u64,
        now: SimTime,
        queue: &mut EventQueue,
    ) {
        if target == self.router_id {
            return;
        }
        self.route_data(length, target, now, queue);
    }

    /// First hop of the cost-shortest path towards the target, using the
    /// adaptive topology snapshot when present and the raw LSDB graph
    /// otherwise.
    pub fn next_hop(&self, target: RouterId) -> Option<RouterId> {
        let path = match &self.adaptive {
            Some(ad) => shortest_path(&ad.current_topo, self.router_id, target),
            None => self.lsdb.shortest_path(target),
        }?;
        path.get(1).copied()
    }

    fn route_data(&mut self, length: u64, dst: RouterId, now: SimTime, queue: &mut EventQueue) {
        if let Some(hop) = self.next_hop(dst) {
            let iface = self
                .link_entries
                .iter()
                .position(|e| e.as_ref().map_or(false, |le| le.router_id == hop));
            if let Some(iface) = iface {
                let _ = self.send(Packet::data(length, dst), iface, now, queue);
                return;
            }
        }
        self.forwarding_failures += 1;
        warn!("{}: no route towards {}, packet dropped", self.name, dst);
    }

    /// Process a packet arriving on an interface.
    pub fn receive(
        &mut self,
        packet: Packet,
        iface: usize,
        now: SimTime,
        queue: &mut EventQueue,
    ) {
        if let Some(ad) = &self.adaptive {
            if !ad.iface_active.get(iface).copied().unwrap_or(false) {
                trace!("{}: packet on disabled interface {}, ignored", self.name, iface);
                return;
            }
        }
        let length = packet.length;
        match packet.kind {
            PacketKind::Data { dst } => {
                if dst == self.router_id {
                    trace!("{}: consumed data packet of {} bits", self.name, length);
                } else {
                    self.route_data(length, dst, now, queue);
                }
            }
            PacketKind::LinkStateDump { header, entries } => {
                if self.lsdb.merge(header.origin, header.seq, &entries) {
                    debug!(
                        "{}: new link-state dump from {} (seq {})",
                        self.name, header.origin, header.seq
                    );
                    let packet = Packet::link_state_dump(header.origin, header.seq, entries);
                    self.broadcast(&packet, &[iface], now, queue);
                    if self.adaptive.is_some() {
                        let mcst = minimum_spanning_tree_links(self.lsdb.graph());
                        if let Some(ad) = &mut self.adaptive {
                            ad.mcst = mcst;
                        }
                    }
                }
            }
            PacketKind::CutUpdate { header, link } => {
                if self.adaptive.is_some() {
                    self.process_cut(header, link, iface, now, queue);
                } else {
                    debug!("{}: cut-update for {} ignored", self.name, link);
                }
            }
            PacketKind::GraftUpdate { header, link } => {
                if self.adaptive.is_some() {
                    self.process_graft(header, link, iface, now, queue);
                } else {
                    debug!("{}: graft-update for {} ignored", self.name, link);
                }
            }
        }
    }

    /// Flood a full dump of the local adjacency with a fresh sequence id.
    /// Entries on sleeping interfaces are left out.
    pub fn broadcast_lsa(&mut self, now: SimTime, queue: &mut EventQueue) {
        let entries: Vec<LinkEntry> = self
            .link_entries
            .iter()
            .enumerate()
            .filter(|(i, e)| e.is_some() && self.interface_status[*i] != InterfaceStatus::Sleep)
            .filter_map(|(_, e)| e.clone())
            .collect();
        let seq = self.next_seq();
        let packet = Packet::link_state_dump(self.router_id, seq, entries);
        self.broadcast(&packet, &[], now, queue);
    }

    /// Reclassify every connected interface from the sampled link state.
    pub fn update_interface_statuses(&mut self, samples: &[Option<LinkSample>]) {
        for iface in 0..self.links.len() {
            if self.links[iface].is_none() {
                continue;
            }
            let sample = match samples.get(iface).copied().flatten() {
                Some(s) => s,
                None => continue,
            };
            self.interface_status[iface] = if !sample.active {
                InterfaceStatus::Sleep
            } else if sample.throughput as f64 > THROUGHPUT_EPSILON {
                InterfaceStatus::Active
            } else {
                InterfaceStatus::Idle
            };
        }
    }

    /// Sleep-control transition: sleep iff no interface is ACTIVE.
    /// Idempotent, the switch counter moves only on an actual change.
    pub fn update_router_status(&mut self) {
        let awake = self
            .interface_status
            .iter()
            .any(|s| *s == InterfaceStatus::Active);
        if let Some(sleep) = &mut self.sleep {
            if sleep.awake != awake {
                sleep.awake = awake;
                sleep.switches += 1;
            }
        }
    }

    /// Interface and router state swaps since the last call, then reset.
    pub fn take_switches(&mut self) -> u64 {
        let mut switches = 0;
        if let Some(ad) = &mut self.adaptive {
            switches += ad.switches;
            ad.switches = 0;
        }
        if let Some(sleep) = &mut self.sleep {
            switches += sleep.switches;
            sleep.switches = 0;
        }
        switches
    }

    /// Replace the LSDB graph with a topology snapshot and refresh the
    /// spanning-tree view.
    pub fn sync_lsdb(&mut self, snapshot: Topology) {
        self.lsdb.sync(snapshot);
        if self.adaptive.is_some() {
            let mcst = minimum_spanning_tree_links(self.lsdb.graph());
            if let Some(ad) = &mut self.adaptive {
                ad.mcst = mcst;
            }
        }
    }

    /// Replace the routing snapshot used by the adaptive module.
    pub fn update_current_topo(&mut self, snapshot: Topology) {
        if let Some(ad) = &mut self.adaptive {
            ad.current_topo = snapshot;
        }
    }

    /// Adaptive control loop: cut under-used links outside the spanning
    /// tree, graft one interface back when a link runs hot.
    pub fn check_link_status(
        &mut self,
        samples: &[Option<LinkSample>],
        now: SimTime,
        queue: &mut EventQueue,
    ) {
        let id = self.router_id;
        let (lower, upper) = match &self.adaptive {
            Some(ad) => (ad.lower_threshold, ad.upper_threshold),
            None => return,
        };
        for iface in 0..self.links.len() {
            let link = match self.links[iface] {
                Some(l) => l,
                None => continue,
            };
            let sample = match samples.get(iface).copied().flatten() {
                Some(s) => s,
                None => continue,
            };
            if !sample.active {
                self.interface_status[iface] = InterfaceStatus::Sleep;
                continue;
            }
            if sample.rate < lower {
                let in_mcst = self
                    .adaptive
                    .as_ref()
                    .map_or(false, |ad| ad.mcst.contains(&link));
                if !in_mcst {
                    // a cut blocked by the cooldown must not flood either
                    if self.cut_on_cooldown(iface, now) {
                        debug!("{}: cut of {} blocked by graft cooldown", self.name, link);
                        continue;
                    }
                    let seq = self.next_seq();
                    if let Some(ad) = &mut self.adaptive {
                        // record own seq so the looped-back flood is stale
                        ad.cut_seen.insert(id, seq);
                    }
                    debug!("{}: cutting under-used link {}", self.name, link);
                    let packet = Packet::cut_update(id, seq, link);
                    self.broadcast(&packet, &[], now, queue);
                    self.deactivate_interface(iface, now, queue);
                }
            } else if sample.rate > upper {
                for iface2 in 0..self.links.len() {
                    let link2 = match self.links[iface2] {
                        Some(l) => l,
                        None => continue,
                    };
                    let inactive = self
                        .adaptive
                        .as_ref()
                        .map_or(false, |ad| !ad.iface_active[iface2]);
                    if inactive {
                        let seq = self.next_seq();
                        if let Some(ad) = &mut self.adaptive {
                            ad.graft_seen.insert(id, seq);
                        }
                        debug!("{}: grafting link {} back", self.name, link2);
                        let packet = Packet::graft_update(id, seq, link2);
                        self.broadcast(&packet, &[], now, queue);
                        self.restore_interface(iface2, now, queue);
                        break;
                    }
                }
                // at most one graft per check cycle
                return;
            }
        }
    }

    fn process_cut(
        &mut self,
        header: LsaHeader,
        link: LinkId,
        arrival: usize,
        now: SimTime,
        queue: &mut EventQueue,
    ) {
        {
            let ad = match &mut self.adaptive {
                Some(a) => a,
                None => return,
            };
            // stale or duplicate floods are the steady state, not an error
            if ad
                .cut_seen
                .get(&header.origin)
                .map_or(false, |&s| s >= header.seq)
            {
                return;
            }
            ad.cut_seen.insert(header.origin, header.seq);
        }
        let packet = Packet::cut_update(header.origin, header.seq, link);
        self.broadcast(&packet, &[arrival], now, queue);
        if link.contains(self.router_id) {
            if let Some(iface) = self.iface_for_link(link) {
                debug!("{}: cut-update names local link {}", self.name, link);
                self.deactivate_interface(iface, now, queue);
            }
        }
    }

    fn process_graft(
        &mut self,
        header: LsaHeader,
        link: LinkId,
        arrival: usize,
        now: SimTime,
        queue: &mut EventQueue,
    ) {
        {
            let ad = match &mut self.adaptive {
                Some(a) => a,
                None => return,
            };
            if ad
                .graft_seen
                .get(&header.origin)
                .map_or(false, |&s| s >= header.seq)
            {
                return;
            }
            ad.graft_seen.insert(header.origin, header.seq);
        }
        let packet = Packet::graft_update(header.origin, header.seq, link);
        self.broadcast(&packet, &[arrival], now, queue);
        if link.contains(self.router_id) {
            if let Some(iface) = self.iface_for_link(link) {
                debug!("{}: graft-update names local link {}", self.name, link);
                self.restore_interface(iface, now, queue);
            }
        }
    }

    /// Cut an interface: clear the activity mask and schedule the link
    /// shutdown. A recently grafted interface is protected by the cooldown.
    fn deactivate_interface(&mut self, iface: usize, now: SimTime, queue: &mut EventQueue) {
        let link = match self.links[iface] {
            Some(l) => l,
            None => return,
        };
        if self.cut_on_cooldown(iface, now) {
            debug!("{}: cut of {} blocked by graft cooldown", self.name, link);
            return;
        }
        let ad = match &mut self.adaptive {
            Some(a) => a,
            None => return,
        };
        if ad.iface_active[iface] {
            ad.iface_active[iface] = false;
            ad.switches += 1;
        }
        queue.schedule(now, Event::LinkAdmin { link, up: false });
    }

    /// Graft an interface back: restore the mask, stamp the cooldown, patch
    /// the routing snapshot and schedule the link reactivation.
    fn restore_interface(&mut self, iface: usize, now: SimTime, queue: &mut EventQueue) {
        let link = match self.links[iface] {
            Some(l) => l,
            None => return,
        };
        let entry = self.link_entries[iface].clone();
        let id = self.router_id;
        let ad = match &mut self.adaptive {
            Some(a) => a,
            None => return,
        };
        if !ad.iface_active[iface] {
            ad.iface_active[iface] = true;
            ad.switches += 1;
        }
        ad.graft_time[iface] = Some(now);
        if let Some(entry) = entry {
            // make the link usable before the next snapshot push
            ad.current_topo.add_edge(
                id,
                entry.router_id,
                LinkAttrs {
                    cost: entry.cost,
                    active: true,
                },
            );
        }
        queue.schedule(now, Event::LinkAdmin { link, up: true });
    }

    /// Whether cutting the interface is currently blocked by a recent graft
    fn cut_on_cooldown(&self, iface: usize, now: SimTime) -> bool {
        self.adaptive.as_ref().map_or(false, |ad| {
            ad.graft_time[iface]
                .map_or(false, |grafted| now - grafted < ad.graft_cooldown)
        })
    }

    fn iface_for_link(&self, link: LinkId) -> Option<usize> {
        self.links.iter().position(|slot| *slot == Some(link))
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.lsa_seq;
        self.lsa_seq += 1;
        seq
    }
}
