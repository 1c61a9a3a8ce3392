//! Module containing all type definitions

use petgraph::graphmap::UnGraphMap;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Router Identification
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct RouterId(pub u32);

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Composite link identification, built from the two terminal routers. The
/// endpoints are stored in normalized order, so the id of the link A-B
/// compares equal no matter which terminal was given first.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct LinkId(RouterId, RouterId);

impl LinkId {
    /// Build the id from the two terminals; the order given does not matter
    pub fn new(a: RouterId, b: RouterId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// First endpoint (smaller router id)
    pub fn a(&self) -> RouterId {
        self.0
    }

    /// Second endpoint (larger router id)
    pub fn b(&self) -> RouterId {
        self.1
    }

    /// returns true if the given router is one of the two endpoints
    pub fn contains(&self, router: RouterId) -> bool {
        self.0 == router || self.1 == router
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// Link Weight for the topology graph
pub type LinkWeight = f64;
/// Virtual simulation time
pub type SimTime = f64;

/// Attributes of a single topology edge
#[derive(Debug, Clone, Copy)]
pub struct LinkAttrs {
    /// Routing cost of the edge
    pub cost: LinkWeight,
    /// Whether the edge may carry traffic
    pub active: bool,
}

// Edges are ordered by cost alone, so the minimum spanning tree selects the
// cheapest adjacency regardless of the active flag.
impl PartialEq for LinkAttrs {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl PartialOrd for LinkAttrs {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.cost.partial_cmp(&other.cost)
    }
}

/// Topology graph: nodes are router ids, edges are keyed by the unordered
/// endpoint pair.
pub type Topology = UnGraphMap<RouterId, LinkAttrs>;

/// Reference bandwidth for the link cost function.
pub const LINK_COST_REF: f64 = 1_000_000.0;

/// Cost of a link, inversely proportional to its bandwidth. Zero or negative
/// bandwidth is rejected at link construction and never reaches this point.
pub fn link_cost(bandwidth: f64) -> LinkWeight {
    LINK_COST_REF / bandwidth
}

/// State of a router interface
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum InterfaceStatus {
    /// Traffic passed through the interface recently
    Active,
    /// The link is up but carried no traffic
    Idle,
    /// The attached link is down
    Sleep,
}

/// State of a neighbor adjacency. Only DOWN and FULL are modeled, there is
/// no adjacency handshake.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum NeighborState {
    /// No adjacency on this interface
    Down,
    /// Adjacency established, advertisements flow
    Full,
}

/// Router and Link Errors
#[derive(Error, Debug, PartialEq)]
pub enum DeviceError {
    /// The interface index does not exist on the router
    #[error("Interface {0} does not exist on this router")]
    InvalidInterface(usize),
    /// The interface exists, but no link is attached
    #[error("Interface {0} is not connected")]
    InterfaceNotConnected(usize),
    /// The interface already has a link attached
    #[error("Interface {0} is already connected")]
    InterfaceOccupied(usize),
    /// A link operation was invoked by a router which is not a terminal
    #[error("Router {0} is not a terminal of this link")]
    NotATerminal(RouterId),
    /// The link terminals are set exactly once and can never be rebound
    #[error("Link already has terminals, create a new link instead")]
    LinkAlreadyBound,
    /// Link bandwidth must be strictly positive
    #[error("Link bandwidth must be positive, but got {0}")]
    InvalidBandwidth(f64),
    /// Loss rate is a probability
    #[error("Link loss rate must lie within [0, 1], but got {0}")]
    InvalidLossRate(f64),
}

/// Network Errors
#[derive(Error, Debug, PartialEq)]
pub enum NetworkError {
    /// Device Error which cannot be handled
    #[error("Device Error: {0}")]
    DeviceError(#[from] DeviceError),
    /// Device is not present in the topology
    #[error("Network device was not found in topology: {0}")]
    DeviceNotFound(RouterId),
    /// Link is not present in the topology
    #[error("Link was not found in topology: {0}")]
    LinkNotFound(LinkId),
    /// Forwarding loop detected while tracing a route
    #[error("Forwarding Loop occurred! path: {0:?}")]
    ForwardingLoop(Vec<&'static str>),
    /// Black hole detected while tracing a route
    #[error("Black hole occurred! path: {0:?}")]
    ForwardingBlackHole(Vec<&'static str>),
}
