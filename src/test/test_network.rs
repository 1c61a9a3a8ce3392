use crate::link::LinkConfig;
use crate::network::{biased_cost, linear_trend, AdaptiveCostConfig, Network};
use crate::packet::{LinkEntry, Packet};
use crate::router::RouterConfig;
use crate::{link_cost, EventQueue, LinkId, NetworkError, RouterId};

/// Helper to check that the traced route matches the expected router names.
fn assert_route_equal(
    net: &Network,
    route: Result<Vec<RouterId>, NetworkError>,
    expected: Vec<&'static str>,
) {
    let route = route.unwrap();
    let names: Vec<&'static str> = route
        .iter()
        .map(|r| net.get_router_name(*r).unwrap())
        .collect();
    assert_eq!(names, expected);
}

/// Line topology A - B - C with converged link-state databases.
fn abc() -> (Network, RouterId, RouterId, RouterId) {
    let mut net = Network::new();
    let a = net.add_router("A", RouterConfig::ospf(1));
    let b = net.add_router("B", RouterConfig::ospf(2));
    let c = net.add_router("C", RouterConfig::ospf(1));
    net.add_link(a, 0, b, 0, LinkConfig::new(100.0)).unwrap();
    net.add_link(b, 1, c, 0, LinkConfig::new(100.0)).unwrap();
    net.broadcast_all_lsas();
    assert!(net.do_queue().unwrap());
    (net, a, b, c)
}

#[test]
fn test_data_forwarding() {
    let (mut net, a, b, c) = abc();
    assert_route_equal(&net, net.get_route(a, c), vec!["A", "B", "C"]);

    net.send_data(a, c, 10).unwrap();
    assert!(net.do_queue().unwrap());
    for id in [a, b, c] {
        assert_eq!(net.get_router(id).unwrap().forwarding_failures(), 0);
    }
    assert_eq!(net.poll_drops(), 0);
}

#[test]
fn test_lsdb_convergence() {
    let (net, a, b, c) = abc();
    // A learned the remote adjacency B-C through flooding
    assert!(net.get_router(a).unwrap().lsdb().graph().contains_edge(b, c));
    assert_eq!(net.get_router(a).unwrap().lsdb().accepted_seq(c), Some(0));
}

#[test]
fn test_forwarding_black_hole() {
    let (mut net, a, _, _) = abc();
    let d = net.add_router("D", RouterConfig::ospf(0));

    net.send_data(a, d, 10).unwrap();
    assert!(net.do_queue().unwrap());
    assert_eq!(net.get_router(a).unwrap().forwarding_failures(), 1);

    match net.get_route(a, d) {
        Err(NetworkError::ForwardingBlackHole(path)) => assert_eq!(path, vec!["A"]),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_forwarding_loop_bounded() {
    let mut net = Network::new();
    let a = net.add_router("A", RouterConfig::ospf(1));
    let b = net.add_router("B", RouterConfig::ospf(1));
    let c = net.add_router("C", RouterConfig::ospf(0));
    net.add_link(a, 0, b, 0, LinkConfig::new(100.0)).unwrap();

    // feed A and B contradictory views: each believes the other reaches C
    let mut scratch = EventQueue::new();
    let towards_c = |origin: RouterId| LinkEntry {
        router_id: c,
        link_id: LinkId::new(origin, c),
        cost: 1.0,
    };
    net.get_router_mut(a).unwrap().receive(
        Packet::link_state_dump(b, 9, vec![towards_c(b)]),
        0,
        0.0,
        &mut scratch,
    );
    net.get_router_mut(b).unwrap().receive(
        Packet::link_state_dump(a, 9, vec![towards_c(a)]),
        0,
        0.0,
        &mut scratch,
    );

    match net.get_route(a, c) {
        Err(NetworkError::ForwardingLoop(path)) => assert_eq!(path, vec!["A", "B", "A"]),
        other => panic!("unexpected result: {:?}", other),
    }

    // the packet bounces between A and B at the same instant; the event
    // loop gives up instead of spinning forever
    net.send_data(a, c, 0).unwrap();
    assert!(!net.run_until(1.0).unwrap());
}

#[test]
fn test_monitoring_lifecycle() {
    let (mut net, _, _, _) = abc();
    net.start_monitoring(1.0);
    net.run_until(3.0).unwrap();
    assert_eq!(net.energy_record().len(), 4);

    // four idle interfaces plus three awake routers
    assert_eq!(net.energy_record()[0], 4.0 * 8.0 + 3.0 * 10.0);
    assert!(net.drop_record().iter().all(|&d| d == 0));

    // after stopping, the pending tick runs dry and nothing is recorded
    let (energy, drops) = net.stop_monitoring();
    net.run_until(6.0).unwrap();
    assert_eq!(energy.len(), 4);
    assert_eq!(drops.len(), 4);
    assert_eq!(net.energy_record().len(), 4);
}

#[test]
fn test_adaptive_cut_graft_cooldown() {
    let mut net = Network::new();
    let a = net.add_router("A", RouterConfig::adaptive(2));
    let b = net.add_router("B", RouterConfig::adaptive(2));
    let c = net.add_router("C", RouterConfig::adaptive(2));
    let ab = net.add_link(a, 0, b, 0, LinkConfig::new(100.0)).unwrap();
    let bc = net.add_link(b, 1, c, 0, LinkConfig::new(200.0)).unwrap();
    let ac = net.add_link(a, 1, c, 1, LinkConfig::new(50.0)).unwrap();
    net.broadcast_all_lsas();
    assert!(net.do_queue().unwrap());

    // the first cycle cuts the idle link outside the spanning tree
    net.start_monitoring(1.0);
    net.run_until(0.0).unwrap();
    let states = net.link_states();
    assert!(states[&ab]);
    assert!(states[&bc]);
    assert!(!states[&ac]);
    assert!(!net.get_router(a).unwrap().interface_enabled(1));
    assert!(!net.get_router(c).unwrap().interface_enabled(1));

    // heavy traffic on A-B pushes its rate to 0.9, grafting A-C back
    net.send_data(a, b, 90).unwrap();
    net.run_until(1.0).unwrap();
    assert!(net.link_states()[&ac]);
    assert!(net.get_router(a).unwrap().interface_enabled(1));
    assert!(net.get_router(c).unwrap().interface_enabled(1));

    // follow-up cut attempts sit out the graft cooldown
    net.run_until(5.9).unwrap();
    assert!(net.link_states()[&ac]);

    // once the cooldown has elapsed the link is cut again
    net.run_until(6.0).unwrap();
    assert!(!net.link_states()[&ac]);
    assert!(!net.get_router(a).unwrap().interface_enabled(1));
}

#[test]
fn test_adaptive_cost_snapshot_sync() {
    let mut net = Network::new();
    let a = net.add_router("A", RouterConfig::ospf(1));
    let b = net.add_router("B", RouterConfig::ospf(2));
    let c = net.add_router("C", RouterConfig::ospf(1));
    net.add_link(a, 0, b, 0, LinkConfig::new(100.0)).unwrap();
    net.add_link(b, 1, c, 0, LinkConfig::new(50.0)).unwrap();
    net.enable_adaptive_cost(AdaptiveCostConfig::default());
    net.broadcast_all_lsas();
    assert!(net.do_queue().unwrap());

    net.start_monitoring(1.0);
    net.run_until(0.0).unwrap();

    // the pushed snapshot carries costs normalized by the largest raw cost;
    // with an empty sample history there is no trend bias yet
    let graph = net.get_router(a).unwrap().lsdb().graph();
    assert_eq!(graph.edge_weight(a, b).unwrap().cost, 0.5);
    assert_eq!(graph.edge_weight(b, c).unwrap().cost, 1.0);
}

#[test]
fn test_linear_trend() {
    assert_eq!(linear_trend(&[1.0, 2.0, 3.0]), 1.0);
    assert_eq!(linear_trend(&[3.0, 2.0, 1.0]), -1.0);
    assert_eq!(linear_trend(&[5.0, 5.0, 5.0]), 0.0);
    assert_eq!(linear_trend(&[4.0]), 0.0);
    assert_eq!(linear_trend(&[]), 0.0);
}

#[test]
fn test_biased_cost() {
    let even = LinkId::new(RouterId(0), RouterId(2));
    let odd = LinkId::new(RouterId(0), RouterId(1));

    // even endpoint parity follows the trend, odd moves against it
    assert!((biased_cost(even, 0.5, 0.1, 1.0) - 0.55).abs() < 1e-12);
    assert!((biased_cost(odd, 0.5, 0.1, 1.0) - 0.45).abs() < 1e-12);

    // the adjustment saturates at 1 and at 2*cost - 1
    assert_eq!(biased_cost(even, 0.9, 1.0, 1.0), 1.0);
    assert!((biased_cost(even, 0.9, -1.0, 1.0) - 0.8).abs() < 1e-12);

    // a cost above 1 saturates instead of inverting the bounds
    assert_eq!(biased_cost(even, 1.2, 0.0, 1.0), 1.0);
    assert_eq!(biased_cost(odd, 1.5, -1.0, 1.0), 1.0);
}

#[test]
fn test_link_cost() {
    assert_eq!(link_cost(100.0), 10_000.0);
    assert!(link_cost(200.0) < link_cost(100.0));
}
