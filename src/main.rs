//! Energy-aware OSPF link-state routing simulation

#![deny(missing_docs)]
#![allow(dead_code)]

mod event;
mod link;
mod lsdb;
mod network;
mod packet;
mod router;
mod types;

pub use event::{Event, EventQueue};
pub use types::*;

#[cfg(test)]
mod test;

use link::LinkConfig;
use network::{AdaptiveCostConfig, Network};
use router::RouterConfig;

/// main function
fn main() {
    env_logger::init();
    green_backbone();
}

fn green_backbone() {
    // Ring r1-r2-r3-r4-r5-r1 with the chords r1-r3 and r2-r4. All routers
    // run the adaptive cut/graft control and the sleep control; the network
    // biases costs with the utilization trend.
    let mut n = Network::new();
    n.enable_adaptive_cost(AdaptiveCostConfig::default());

    let config = RouterConfig::adaptive(4).with_sleep();
    let r1 = n.add_router("R1", config);
    let r2 = n.add_router("R2", config);
    let r3 = n.add_router("R3", config);
    let r4 = n.add_router("R4", config);
    let r5 = n.add_router("R5", config);

    n.add_link(r1, 0, r2, 0, LinkConfig::new(100.0)).unwrap();
    n.add_link(r2, 1, r3, 0, LinkConfig::new(100.0)).unwrap();
    n.add_link(r3, 1, r4, 0, LinkConfig::new(100.0)).unwrap();
    n.add_link(r4, 1, r5, 0, LinkConfig::new(100.0)).unwrap();
    n.add_link(r5, 1, r1, 1, LinkConfig::new(100.0)).unwrap();
    n.add_link(r1, 2, r3, 2, LinkConfig::new(50.0)).unwrap();
    n.add_link(r2, 2, r4, 2, LinkConfig::new(50.0)).unwrap();

    // converge the link-state databases
    n.broadcast_all_lsas();
    n.do_queue().unwrap();

    // first monitor cycle pushes the initial topology snapshot
    n.start_monitoring(1.0);
    n.run_until(0.0).unwrap();

    // drive a few flows for thirty time units
    for t in 1..=30u32 {
        n.send_data(r1, r4, 40).unwrap();
        n.send_data(r2, r5, 30).unwrap();
        if t % 3 == 0 {
            n.send_data(r3, r1, 25).unwrap();
        }
        n.run_until(t as f64).unwrap();
    }

    let (energy, drops) = n.stop_monitoring();
    println!("samples: {}", energy.len());
    println!(
        "energy: first {:.2}, last {:.2}",
        energy.first().copied().unwrap_or(0.0),
        energy.last().copied().unwrap_or(0.0)
    );
    println!("dropped packets: {}", drops.iter().sum::<u64>());

    match n.get_route(r1, r4) {
        Ok(path) => println!(
            "route R1 -> R4: {}",
            path.iter()
                .map(|r| n.get_router_name(*r).unwrap())
                .collect::<Vec<_>>()
                .join(" => ")
        ),
        Err(e) => println!("route R1 -> R4: {}", e),
    }

    for (link, up) in n.link_states() {
        println!("link {}: {}", link, if up { "up" } else { "cut" });
    }
}
