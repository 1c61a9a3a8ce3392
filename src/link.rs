//! Module defining a point-to-point link between two router interfaces.
//!
//! A link is a capacity gate, not a queue: a packet which does not fit into
//! the current bandwidth window is dropped, never buffered.

use crate::{DeviceError, LinkId, RouterId, SimTime};
use rand::Rng;

/// Width of the usage window in virtual time units.
const USAGE_WINDOW: SimTime = 1.0;

/// Static parameters of a link.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Capacity in bits per time unit
    pub bandwidth: f64,
    /// Propagation delay applied to every delivered packet
    pub delay: SimTime,
    /// Independent loss probability per packet
    pub loss_rate: f64,
}

impl LinkConfig {
    pub fn new(bandwidth: f64) -> Self {
        Self {
            bandwidth,
            delay: 0.0,
            loss_rate: 0.0,
        }
    }

    pub fn delay(mut self, delay: SimTime) -> Self {
        self.delay = delay;
        self
    }

    pub fn loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate;
        self
    }
}

/// One bound terminal: the router and the interface index on that router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal {
    pub router: RouterId,
    pub iface: usize,
}

/// Outcome of a single transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transmission {
    /// The packet will arrive at the peer terminal at the given time
    Delivered {
        to: RouterId,
        iface: usize,
        at: SimTime,
    },
    /// The link is administratively down, nothing happened
    Inactive,
    /// The bandwidth window is exhausted, the packet was dropped
    Dropped,
    /// The packet fell to random loss
    Lost,
}

#[derive(Debug)]
pub struct Link {
    config: LinkConfig,
    terminals: Option<(Terminal, Terminal)>,
    active: bool,
    /// Bits admitted in the current usage window
    used_in_window: u64,
    last_checkpoint: SimTime,
    dropped_packets: u64,
}

impl Link {
    /// Create an unbound link. Zero or negative bandwidth and loss rates
    /// outside [0, 1] are configuration errors.
    pub fn new(config: LinkConfig) -> Result<Self, DeviceError> {
        if config.bandwidth <= 0.0 {
            return Err(DeviceError::InvalidBandwidth(config.bandwidth));
        }
        if !(0.0..=1.0).contains(&config.loss_rate) {
            return Err(DeviceError::InvalidLossRate(config.loss_rate));
        }
        Ok(Self {
            config,
            terminals: None,
            active: true,
            used_in_window: 0,
            last_checkpoint: 0.0,
            dropped_packets: 0,
        })
    }

    /// Bind both terminals. This is done exactly once per link; a second
    /// call fails without touching the existing binding.
    pub fn connect(&mut self, a: Terminal, b: Terminal) -> Result<LinkId, DeviceError> {
        if self.terminals.is_some() {
            return Err(DeviceError::LinkAlreadyBound);
        }
        self.terminals = Some((a, b));
        self.active = true;
        Ok(LinkId::new(a.router, b.router))
    }

    /// Composite id of the link, available once connected
    pub fn id(&self) -> Option<LinkId> {
        self.terminals
            .map(|(a, b)| LinkId::new(a.router, b.router))
    }

    pub fn bandwidth(&self) -> f64 {
        self.config.bandwidth
    }

    pub fn delay(&self) -> SimTime {
        self.config.delay
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn terminals(&self) -> Option<(Terminal, Terminal)> {
        self.terminals
    }

    /// Disable this link (idempotent)
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Re-enable this link (idempotent)
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// The terminal opposite to the given router
    pub fn opposite(&self, from: RouterId) -> Result<Terminal, DeviceError> {
        let (a, b) = self.terminals.ok_or(DeviceError::NotATerminal(from))?;
        if from == a.router {
            Ok(b)
        } else if from == b.router {
            Ok(a)
        } else {
            Err(DeviceError::NotATerminal(from))
        }
    }

    /// Attempt to push a packet of `length` bits across the link.
    ///
    /// An inactive link refuses without counting a drop. A full bandwidth
    /// window counts a drop. The loss draw happens after admission, so a
    /// lost packet still consumed its share of the window.
    pub fn transmit(
        &mut self,
        from: RouterId,
        length: u64,
        now: SimTime,
        rng: &mut impl Rng,
    ) -> Result<Transmission, DeviceError> {
        if !self.active {
            return Ok(Transmission::Inactive);
        }
        let peer = self.opposite(from)?;

        if self.used_in_window as f64 + length as f64 > self.config.bandwidth {
            self.dropped_packets += 1;
            return Ok(Transmission::Dropped);
        }
        self.used_in_window += length;
        if now - self.last_checkpoint > USAGE_WINDOW {
            self.used_in_window = 0;
            self.last_checkpoint = now;
        }

        if rng.random::<f64>() < self.config.loss_rate {
            return Ok(Transmission::Lost);
        }

        Ok(Transmission::Delivered {
            to: peer.router,
            iface: peer.iface,
            at: now + self.config.delay,
        })
    }

    /// Bits sent since the last reset
    pub fn sample_throughput(&mut self, reset: bool) -> u64 {
        let throughput = self.used_in_window;
        if reset {
            self.used_in_window = 0;
        }
        throughput
    }

    /// Link usage as a proportion of the bandwidth since the last reset
    pub fn activity_rate(&mut self, reset: bool) -> f64 {
        let rate = self.used_in_window as f64 / self.config.bandwidth;
        if reset {
            self.used_in_window = 0;
        }
        rate
    }

    /// Packets dropped by admission control since the last reset
    pub fn sample_dropped_packets(&mut self, reset: bool) -> u64 {
        let dropped = self.dropped_packets;
        if reset {
            self.dropped_packets = 0;
        }
        dropped
    }
}
