//! Module for defining events

use crate::packet::Packet;
use crate::{LinkId, RouterId, SimTime};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Event to handle
#[derive(Debug, Clone)]
pub enum Event {
    /// Hand a packet from a router to one of its links. Admission control,
    /// the loss draw and the propagation delay happen when this executes.
    Transmit {
        /// Link to push the packet onto
        link: LinkId,
        /// Router at the sending terminal
        from: RouterId,
        /// The packet in flight
        packet: Packet,
    },
    /// Deliver a packet to a router on the given interface
    Deliver {
        /// Receiving router
        to: RouterId,
        /// Interface the packet arrives on
        iface: usize,
        /// The packet in flight
        packet: Packet,
    },
    /// Administratively toggle a link (cut or graft taking effect)
    LinkAdmin {
        /// Link to toggle
        link: LinkId,
        /// New activity state
        up: bool,
    },
    /// Periodic monitor tick
    Monitor,
}

#[derive(Debug, Clone)]
struct ScheduledEvent {
    time: SimTime,
    seq: u64,
    event: Event,
}

// The heap is a max-heap, so the ordering is inverted: the earliest time
// (and for equal times, the earliest enqueued event) compares greatest.
// The enqueue sequence keeps per-link delivery in FIFO order.
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

/// Event queue ordered by virtual delivery time.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event for execution at the given virtual time
    pub fn schedule(&mut self, time: SimTime, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { time, seq, event });
    }

    /// Pop the next event together with its scheduled time
    pub fn pop(&mut self) -> Option<(SimTime, Event)> {
        self.heap.pop().map(|s| (s.time, s.event))
    }

    /// Scheduled time of the next event, if any
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|s| s.time)
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue holds no pending events
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
