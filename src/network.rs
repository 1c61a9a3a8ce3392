//! Module defining the network: owner of all routers and links, the event
//! loop, the periodic monitor and the energy/drop aggregation.

use crate::event::{Event, EventQueue};
use crate::link::{Link, LinkConfig, Terminal, Transmission};
use crate::router::{LinkSample, Router, RouterConfig};
use crate::{
    link_cost, InterfaceStatus, LinkAttrs, LinkId, LinkWeight, NetworkError, RouterId, SimTime,
    Topology,
};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

static DEFAULT_STOP_AFTER: usize = 10_000;
const DEFAULT_SEED: u64 = 0x600D_5EED;
/// Floor of the biased cost, so an adjusted edge never becomes free.
const MIN_BIASED_COST: f64 = 1e-3;

/// Constants of the energy accounting.
#[derive(Debug, Clone, Copy)]
pub struct EnergyModel {
    /// Energy per transmitted bit
    pub throughput_energy: f64,
    pub active_interface: f64,
    pub idle_interface: f64,
    pub sleep_interface: f64,
    /// Penalty per interface or router state swap
    pub swap_state: f64,
    /// Baseline of an awake router
    pub awake_router: f64,
    /// Baseline of a sleeping router
    pub asleep_router: f64,
}

impl Default for EnergyModel {
    fn default() -> Self {
        Self {
            throughput_energy: 0.000_000_1,
            active_interface: 10.0,
            idle_interface: 8.0,
            sleep_interface: 0.16,
            swap_state: 20.0,
            awake_router: 10.0,
            asleep_router: 0.5,
        }
    }
}

/// Parameters of the adaptive cost controller.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveCostConfig {
    /// Links above this utilization are never biased
    pub safety_threshold: f64,
    /// Number of recent utilization samples fed to the regression
    pub lookback: usize,
    /// Scale of the trend-proportional adjustment
    pub gain: f64,
}

impl Default for AdaptiveCostConfig {
    fn default() -> Self {
        Self {
            safety_threshold: 0.9,
            lookback: 10,
            gain: 1.0,
        }
    }
}

/// Cost controller: normalizes link costs by the largest cost observed so
/// far and biases them with the network-wide utilization trend.
#[derive(Debug)]
struct CostController {
    config: AdaptiveCostConfig,
    max_cost: LinkWeight,
}

impl CostController {
    fn new(config: AdaptiveCostConfig) -> Self {
        Self {
            config,
            max_cost: 0.0,
        }
    }

    /// Track the running maximum. The snapshot is rebuilt from raw costs
    /// every cycle, so a new maximum renormalizes every existing link.
    fn observe(&mut self, cost: LinkWeight) {
        if cost > self.max_cost {
            self.max_cost = cost;
        }
    }

    fn normalized(&self, cost: LinkWeight) -> LinkWeight {
        if self.max_cost > 0.0 {
            cost / self.max_cost
        } else {
            cost
        }
    }

    fn biased(&self, link: LinkId, cost: LinkWeight, slope: f64) -> LinkWeight {
        biased_cost(link, cost, slope, self.config.gain)
    }
}

/// Nudge a normalized cost along the utilization trend. The direction
/// alternates with the endpoint-id parity so parallel paths drift apart
/// instead of moving in lockstep. The result is clamped to
/// [max(2*cost - 1, floor), 1].
pub fn biased_cost(link: LinkId, cost: LinkWeight, slope: f64, gain: f64) -> LinkWeight {
    let parity = if (link.a().0 + link.b().0) % 2 == 0 {
        1.0
    } else {
        -1.0
    };
    let adjusted = cost * (1.0 + parity * gain * slope);
    // the lower bound may not exceed the upper one for costs above 1
    let floor = (2.0 * cost - 1.0).max(MIN_BIASED_COST).min(1.0);
    adjusted.clamp(floor, 1.0)
}

/// Least-squares slope of equally spaced samples.
pub fn linear_trend(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = samples.iter().sum::<f64>() / nf;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in samples.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[derive(Debug)]
pub struct Network {
    routers: HashMap<RouterId, Router>,
    links: HashMap<LinkId, Link>,
    queue: EventQueue,
    now: SimTime,
    next_router_id: u32,
    stop_after: Option<usize>,
    rng: StdRng,
    energy_model: EnergyModel,
    adaptive_cost: Option<CostController>,
    monitoring: bool,
    monitor_interval: SimTime,
    energy_record: Vec<f64>,
    drop_record: Vec<u64>,
    utilization_record: Vec<f64>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// Create a network with an explicit RNG seed for reproducible loss.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            routers: HashMap::new(),
            links: HashMap::new(),
            queue: EventQueue::new(),
            now: 0.0,
            next_router_id: 0,
            stop_after: Some(DEFAULT_STOP_AFTER),
            rng: StdRng::seed_from_u64(seed),
            energy_model: EnergyModel::default(),
            adaptive_cost: None,
            monitoring: false,
            monitor_interval: 1.0,
            energy_record: Vec::new(),
            drop_record: Vec::new(),
            utilization_record: Vec::new(),
        }
    }

    /// Configure the event loop to pause and return after a certain number
    /// of events have been executed. If set to None, the loop will continue
    /// running until converged.
    pub fn stop_after_queue(&mut self, stop_after: Option<usize>) {
        self.stop_after = stop_after;
    }

    pub fn set_energy_model(&mut self, model: EnergyModel) {
        self.energy_model = model;
    }

    /// Turn on the adaptive cost controller (the EcoRP variant): topology
    /// snapshots pushed by the monitor carry normalized, trend-biased costs.
    pub fn enable_adaptive_cost(&mut self, config: AdaptiveCostConfig) {
        let mut controller = CostController::new(config);
        for link in self.links.values() {
            controller.observe(link_cost(link.bandwidth()));
        }
        self.adaptive_cost = Some(controller);
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// add a new router to the topology and return its id
    pub fn add_router(&mut self, name: &'static str, config: RouterConfig) -> RouterId {
        let router_id = RouterId(self.next_router_id);
        self.next_router_id += 1;
        self.routers
            .insert(router_id, Router::new(name, router_id, config));
        router_id
    }

    /// # Create a link
    ///
    /// Create and connect a link between two router interfaces. The link is
    /// bound exactly once; both routers record the adjacency with cost
    /// `link_cost(bandwidth)`.
    pub fn add_link(
        &mut self,
        a: RouterId,
        iface_a: usize,
        b: RouterId,
        iface_b: usize,
        config: LinkConfig,
    ) -> Result<LinkId, NetworkError> {
        let mut link = Link::new(config)?;
        let link_id = link.connect(
            Terminal {
                router: a,
                iface: iface_a,
            },
            Terminal {
                router: b,
                iface: iface_b,
            },
        )?;
        let cost = link_cost(config.bandwidth);
        self.routers
            .get_mut(&a)
            .ok_or(NetworkError::DeviceNotFound(a))?
            .attach_link(iface_a, link_id, b, cost)?;
        self.routers
            .get_mut(&b)
            .ok_or(NetworkError::DeviceNotFound(b))?
            .attach_link(iface_b, link_id, a, cost)?;
        if let Some(controller) = &mut self.adaptive_cost {
            controller.observe(cost);
        }
        self.links.insert(link_id, link);
        Ok(link_id)
    }

    /// Get an immutable reference to a router
    pub fn get_router(&self, router: RouterId) -> Result<&Router, NetworkError> {
        self.routers
            .get(&router)
            .ok_or(NetworkError::DeviceNotFound(router))
    }

    /// Get a mutable reference to a router
    pub fn get_router_mut(&mut self, router: RouterId) -> Result<&mut Router, NetworkError> {
        self.routers
            .get_mut(&router)
            .ok_or(NetworkError::DeviceNotFound(router))
    }

    /// return the name of the router
    pub fn get_router_name(&self, router_id: RouterId) -> Result<&'static str, NetworkError> {
        self.routers
            .get(&router_id)
            .map(|r| r.name())
            .ok_or(NetworkError::DeviceNotFound(router_id))
    }

    pub fn get_link(&self, link: LinkId) -> Result<&Link, NetworkError> {
        self.links.get(&link).ok_or(NetworkError::LinkNotFound(link))
    }

    /// Administratively toggle a link
    pub fn set_link_state(&mut self, link: LinkId, up: bool) -> Result<(), NetworkError> {
        let l = self
            .links
            .get_mut(&link)
            .ok_or(NetworkError::LinkNotFound(link))?;
        if up {
            l.activate();
        } else {
            l.deactivate();
        }
        Ok(())
    }

    /// The active flag of every link, keyed by link id
    pub fn link_states(&self) -> HashMap<LinkId, bool> {
        self.links
            .iter()
            .map(|(id, link)| (*id, link.is_active()))
            .collect()
    }

    /// Let every router flood a full link-state dump
    pub fn broadcast_all_lsas(&mut self) {
        let ids: Vec<RouterId> = self.routers.keys().cloned().collect();
        for id in ids {
            if let Some(r) = self.routers.get_mut(&id) {
                r.broadcast_lsa(self.now, &mut self.queue);
            }
        }
    }

    /// Originate a data packet at `src` addressed to `dst`
    pub fn send_data(
        &mut self,
        src: RouterId,
        dst: RouterId,
        length: u64,
    ) -> Result<(), NetworkError> {
        let now = self.now;
        let queue = &mut self.queue;
        self.routers
            .get_mut(&src)
            .ok_or(NetworkError::DeviceNotFound(src))?
            .send_to_router(dst, length, now, queue);
        Ok(())
    }

    /// Execute the queue until it is empty.
    /// Returns Ok(false) if max iterations is exceeded.
    /// Returns Ok(true) if everything was fine.
    pub fn do_queue(&mut self) -> Result<bool, NetworkError> {
        let mut remaining_iter = self.stop_after;
        while let Some((time, event)) = self.queue.pop() {
            if let Some(rem) = remaining_iter {
                if rem == 0 {
                    return Ok(false);
                }
                remaining_iter = Some(rem - 1);
            }
            self.process_event(time, event)?;
        }
        Ok(true)
    }

    /// Execute every event scheduled up to (and including) the deadline,
    /// then advance the clock to it.
    /// Returns Ok(false) if max iterations is exceeded.
    /// Returns Ok(true) if everything was fine.
    pub fn run_until(&mut self, deadline: SimTime) -> Result<bool, NetworkError> {
        let mut remaining_iter = self.stop_after;
        while self.queue.peek_time().map_or(false, |t| t <= deadline) {
            if let Some(rem) = remaining_iter {
                if rem == 0 {
                    return Ok(false);
                }
                remaining_iter = Some(rem - 1);
            }
            if let Some((time, event)) = self.queue.pop() {
                self.process_event(time, event)?;
            }
        }
        if self.now < deadline {
            self.now = deadline;
        }
        Ok(true)
    }

    fn process_event(&mut self, time: SimTime, event: Event) -> Result<(), NetworkError> {
        self.now = time;
        match event {
            Event::Transmit { link, from, packet } => {
                let l = self
                    .links
                    .get_mut(&link)
                    .ok_or(NetworkError::LinkNotFound(link))?;
                match l.transmit(from, packet.length, time, &mut self.rng)? {
                    Transmission::Delivered { to, iface, at } => {
                        trace!("{}: {} -> {} delivering at {}", link, from, to, at);
                        self.queue.schedule(at, Event::Deliver { to, iface, packet });
                    }
                    Transmission::Dropped => {
                        debug!("{}: packet dropped, bandwidth window full", link)
                    }
                    Transmission::Lost => debug!("{}: packet lost", link),
                    Transmission::Inactive => trace!("{}: transmit on inactive link", link),
                }
            }
            Event::Deliver { to, iface, packet } => {
                let now = self.now;
                let queue = &mut self.queue;
                self.routers
                    .get_mut(&to)
                    .ok_or(NetworkError::DeviceNotFound(to))?
                    .receive(packet, iface, now, queue);
            }
            Event::LinkAdmin { link, up } => {
                debug!("{}: administratively {}", link, if up { "up" } else { "down" });
                self.set_link_state(link, up)?;
            }
            Event::Monitor => {
                // a cancelled monitor stops here, at its scheduling point
                if self.monitoring {
                    self.monitor_cycle();
                    self.queue
                        .schedule(self.now + self.monitor_interval, Event::Monitor);
                }
            }
        }
        Ok(())
    }

    /// Start the periodic monitor. Previous records are cleared.
    pub fn start_monitoring(&mut self, interval: SimTime) {
        self.energy_record.clear();
        self.drop_record.clear();
        self.utilization_record.clear();
        self.monitoring = true;
        self.monitor_interval = interval;
        self.queue.schedule(self.now, Event::Monitor);
    }

    /// Stop monitoring and return the energy and drop records. Already taken
    /// samples are kept.
    pub fn stop_monitoring(&mut self) -> (Vec<f64>, Vec<u64>) {
        self.monitoring = false;
        (self.energy_record.clone(), self.drop_record.clone())
    }

    pub fn energy_record(&self) -> &[f64] {
        &self.energy_record
    }

    pub fn drop_record(&self) -> &[u64] {
        &self.drop_record
    }

    pub fn utilization_record(&self) -> &[f64] {
        &self.utilization_record
    }

    /// One monitoring cycle: refresh router state, run the adaptive control
    /// loops, push the topology snapshot and append the sample history.
    fn monitor_cycle(&mut self) {
        // utilization is sampled before the energy poll resets the windows
        let utilization = self.average_utilization();

        let ids: Vec<RouterId> = self.routers.keys().cloned().collect();
        for id in &ids {
            let samples = self.samples_for(*id);
            let now = self.now;
            let queue = &mut self.queue;
            if let Some(router) = self.routers.get_mut(id) {
                router.update_interface_statuses(&samples);
                router.check_link_status(&samples, now, queue);
                router.update_router_status();
            }
        }

        let snapshot = if self.adaptive_cost.is_some() {
            self.biased_active_state()
        } else {
            self.active_network_state()
        };
        for id in &ids {
            if let Some(router) = self.routers.get_mut(id) {
                router.update_current_topo(snapshot.clone());
                if self.adaptive_cost.is_some() {
                    router.sync_lsdb(snapshot.clone());
                }
            }
        }

        let energy = self.poll_energy();
        let drops = self.poll_drops();
        info!(
            "monitor t={:.1}: energy={:.2} drops={} utilization={:.3}",
            self.now, energy, drops, utilization
        );
        self.energy_record.push(energy);
        self.drop_record.push(drops);
        self.utilization_record.push(utilization);
    }

    /// Per-interface link samples for one router, without resetting any
    /// counter.
    fn samples_for(&mut self, router: RouterId) -> Vec<Option<LinkSample>> {
        let slots: Vec<Option<LinkId>> = match self.routers.get(&router) {
            Some(r) => r.interfaces().to_vec(),
            None => return Vec::new(),
        };
        slots
            .into_iter()
            .map(|slot| {
                slot.and_then(|id| self.links.get_mut(&id)).map(|link| LinkSample {
                    active: link.is_active(),
                    throughput: link.sample_throughput(false),
                    rate: link.activity_rate(false),
                })
            })
            .collect()
    }

    /// Mean link utilization, sampled without reset
    fn average_utilization(&mut self) -> f64 {
        if self.links.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .links
            .values_mut()
            .map(|l| l.activity_rate(false))
            .sum();
        sum / self.links.len() as f64
    }

    /// Total energy of the network: interface constants, state-swap
    /// penalties, router baselines and a throughput-proportional term. The
    /// throughput windows are reset by this poll.
    pub fn poll_energy(&mut self) -> f64 {
        let model = self.energy_model;
        let mut energy = 0.0;
        let ids: Vec<RouterId> = self.routers.keys().cloned().collect();
        for id in ids {
            if let Some(router) = self.routers.get_mut(&id) {
                for status in router.interface_statuses() {
                    energy += match status {
                        InterfaceStatus::Active => model.active_interface,
                        InterfaceStatus::Idle => model.idle_interface,
                        InterfaceStatus::Sleep => model.sleep_interface,
                    };
                }
                energy += router.take_switches() as f64 * model.swap_state;
                energy += if router.is_awake() {
                    model.awake_router
                } else {
                    model.asleep_router
                };
            }
        }
        let throughput: u64 = self
            .links
            .values_mut()
            .map(|l| l.sample_throughput(true))
            .sum();
        energy + throughput as f64 * model.throughput_energy
    }

    /// Sum and reset the per-link drop counters
    pub fn poll_drops(&mut self) -> u64 {
        self.links
            .values_mut()
            .map(|l| l.sample_dropped_packets(true))
            .sum()
    }

    /// Map of the current network state, including inactive links
    pub fn network_state(&self) -> Topology {
        let mut state = Topology::new();
        for id in self.routers.keys() {
            state.add_node(*id);
        }
        for (id, link) in &self.links {
            state.add_edge(
                id.a(),
                id.b(),
                LinkAttrs {
                    cost: link_cost(link.bandwidth()),
                    active: link.is_active(),
                },
            );
        }
        state
    }

    /// Map of the current network state, using only active links
    pub fn active_network_state(&self) -> Topology {
        let mut state = Topology::new();
        for id in self.routers.keys() {
            state.add_node(*id);
        }
        for (id, link) in &self.links {
            if link.is_active() {
                state.add_edge(
                    id.a(),
                    id.b(),
                    LinkAttrs {
                        cost: link_cost(link.bandwidth()),
                        active: true,
                    },
                );
            }
        }
        state
    }

    /// Active network state with normalized, trend-biased costs. Links
    /// running above the safety threshold keep their normalized cost.
    fn biased_active_state(&mut self) -> Topology {
        let (safety, lookback) = match &self.adaptive_cost {
            Some(c) => (c.config.safety_threshold, c.config.lookback),
            None => return self.active_network_state(),
        };
        let start = self.utilization_record.len().saturating_sub(lookback);
        let slope = linear_trend(&self.utilization_record[start..]);

        let mut state = Topology::new();
        for id in self.routers.keys() {
            state.add_node(*id);
        }
        let link_ids: Vec<LinkId> = self.links.keys().cloned().collect();
        for id in link_ids {
            let (active, rate, bandwidth) = match self.links.get_mut(&id) {
                Some(link) => (link.is_active(), link.activity_rate(false), link.bandwidth()),
                None => continue,
            };
            if !active {
                continue;
            }
            let controller = match &self.adaptive_cost {
                Some(c) => c,
                None => continue,
            };
            let normalized = controller.normalized(link_cost(bandwidth));
            let cost = if rate < safety {
                controller.biased(id, normalized, slope)
            } else {
                normalized
            };
            state.add_edge(id.a(), id.b(), LinkAttrs { cost, active: true });
        }
        state
    }

    /// return the hop-by-hop route from source towards target, following
    /// each router's own forwarding decision.
    pub fn get_route(
        &self,
        source: RouterId,
        target: RouterId,
    ) -> Result<Vec<RouterId>, NetworkError> {
        let mut visited: Vec<RouterId> = Vec::new();
        let mut current = source;
        loop {
            let router = self
                .routers
                .get(&current)
                .ok_or(NetworkError::DeviceNotFound(current))?;
            if visited.contains(&current) {
                visited.push(current);
                return Err(NetworkError::ForwardingLoop(self.route_names(&visited)?));
            }
            visited.push(current);
            if current == target {
                return Ok(visited);
            }
            current = match router.next_hop(target) {
                Some(hop) => hop,
                None => {
                    return Err(NetworkError::ForwardingBlackHole(
                        self.route_names(&visited)?,
                    ))
                }
            };
        }
    }

    fn route_names(&self, route: &[RouterId]) -> Result<Vec<&'static str>, NetworkError> {
        route.iter().map(|r| self.get_router_name(*r)).collect()
    }
}
