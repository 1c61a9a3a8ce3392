//! Module containing the in-process message model: data packets and the
//! three kinds of link-state advertisement.

use crate::{LinkId, LinkWeight, RouterId};

/// A single row of a router's local adjacency, advertised to others inside a
/// full link-state dump.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEntry {
    /// Neighbor on the far end of the link
    pub router_id: RouterId,
    /// Composite id of the link leading to that neighbor
    pub link_id: LinkId,
    /// Advertised cost of the link
    pub cost: LinkWeight,
}

/// Header carried by every link-state advertisement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LsaHeader {
    /// Router which originated the advertisement
    pub origin: RouterId,
    /// Monotonically increasing sequence id, local to the origin
    pub seq: u64,
}

/// The kind of a packet, together with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketKind {
    /// Payload-carrying packet addressed to a destination router
    Data { dst: RouterId },
    /// Full dump of the origin's adjacency list
    LinkStateDump {
        header: LsaHeader,
        entries: Vec<LinkEntry>,
    },
    /// Advertisement that a link was cut to save energy
    CutUpdate { header: LsaHeader, link: LinkId },
    /// Advertisement that a previously cut link was grafted back
    GraftUpdate { header: LsaHeader, link: LinkId },
}

/// An in-flight packet. Immutable once handed to a link.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Length in bits, counted against the link bandwidth window
    pub length: u64,
    pub kind: PacketKind,
}

impl Packet {
    /// Create a data packet addressed to `dst`
    pub fn data(length: u64, dst: RouterId) -> Self {
        Self {
            length,
            kind: PacketKind::Data { dst },
        }
    }

    /// Create a full link-state dump. Advertisements have zero length, they
    /// never count against the bandwidth window.
    pub fn link_state_dump(origin: RouterId, seq: u64, entries: Vec<LinkEntry>) -> Self {
        Self {
            length: 0,
            kind: PacketKind::LinkStateDump {
                header: LsaHeader { origin, seq },
                entries,
            },
        }
    }

    /// Create a cut-update advertisement referencing one link
    pub fn cut_update(origin: RouterId, seq: u64, link: LinkId) -> Self {
        Self {
            length: 0,
            kind: PacketKind::CutUpdate {
                header: LsaHeader { origin, seq },
                link,
            },
        }
    }

    /// Create a graft-update advertisement referencing one link
    pub fn graft_update(origin: RouterId, seq: u64, link: LinkId) -> Self {
        Self {
            length: 0,
            kind: PacketKind::GraftUpdate {
                header: LsaHeader { origin, seq },
                link,
            },
        }
    }
}
