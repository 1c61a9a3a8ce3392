use crate::lsdb::{minimum_spanning_tree_links, shortest_path, LinkStateDatabase};
use crate::packet::LinkEntry;
use crate::{LinkAttrs, LinkId, RouterId, Topology};
use maplit::hashset;

fn entry(neighbor: u32, origin: u32, cost: f64) -> LinkEntry {
    LinkEntry {
        router_id: RouterId(neighbor),
        link_id: LinkId::new(RouterId(origin), RouterId(neighbor)),
        cost,
    }
}

#[test]
fn test_merge_monotonic_sequence() {
    let a = RouterId(0);
    let b = RouterId(1);
    let c = RouterId(2);
    let mut db = LinkStateDatabase::new(a);

    // first advertisement from b is new
    assert!(db.merge(b, 0, &[entry(2, 1, 1.0)]));
    assert!(db.graph().contains_edge(b, c));
    assert_eq!(db.accepted_seq(b), Some(0));

    // same sequence again: no-op
    assert!(!db.merge(b, 0, &[entry(2, 1, 1.0)]));
    assert!(db.graph().contains_edge(b, c));

    // strictly newer sequence replaces the adjacency
    assert!(db.merge(b, 2, &[entry(3, 1, 2.0)]));
    assert!(!db.graph().contains_edge(b, c));
    assert!(db.graph().contains_edge(b, RouterId(3)));
    assert_eq!(db.accepted_seq(b), Some(2));

    // older sequence: no-op
    assert!(!db.merge(b, 1, &[entry(2, 1, 1.0)]));
    assert!(!db.graph().contains_edge(b, c));
}

#[test]
fn test_merge_preserves_direct_edge() {
    let a = RouterId(0);
    let b = RouterId(1);
    let mut db = LinkStateDatabase::new(a);
    db.add_direct_edge(b, 10.0);

    // b advertises an empty adjacency; the physical edge a-b survives
    assert!(db.merge(b, 0, &[]));
    let attrs = db.graph().edge_weight(a, b).unwrap();
    assert_eq!(attrs.cost, 10.0);
}

#[test]
fn test_merge_skips_self_entries() {
    let a = RouterId(0);
    let b = RouterId(1);
    let mut db = LinkStateDatabase::new(a);

    // b advertises its link back to a; without a physical adjacency the
    // local router gains no edge from it
    assert!(db.merge(b, 0, &[entry(0, 1, 1.0)]));
    assert!(!db.graph().contains_edge(a, b));
}

#[test]
fn test_shortest_path_by_cost() {
    let a = RouterId(0);
    let b = RouterId(1);
    let c = RouterId(2);
    let mut db = LinkStateDatabase::new(a);
    // direct edges: cheap towards b, expensive towards c
    db.add_direct_edge(b, 1.0);
    db.add_direct_edge(c, 10.0);
    // b advertises a cheap link to c
    assert!(db.merge(b, 0, &[entry(0, 1, 1.0), entry(2, 1, 1.0)]));

    // fewer hops would go directly, but cost prefers the detour
    assert_eq!(db.shortest_path(c), Some(vec![a, b, c]));
    assert_eq!(db.shortest_path(RouterId(9)), None);
}

#[test]
fn test_shortest_path_ignores_inactive_edges() {
    let a = RouterId(0);
    let b = RouterId(1);
    let c = RouterId(2);
    let mut topo = Topology::new();
    topo.add_edge(a, b, LinkAttrs { cost: 1.0, active: true });
    topo.add_edge(b, c, LinkAttrs { cost: 1.0, active: false });
    topo.add_edge(a, c, LinkAttrs { cost: 5.0, active: true });

    // the cheap path crosses an inactive edge and must be avoided
    assert_eq!(shortest_path(&topo, a, c), Some(vec![a, c]));
}

#[test]
fn test_minimum_spanning_tree() {
    let a = RouterId(0);
    let b = RouterId(1);
    let c = RouterId(2);
    let mut topo = Topology::new();
    topo.add_edge(a, b, LinkAttrs { cost: 1.0, active: true });
    topo.add_edge(b, c, LinkAttrs { cost: 2.0, active: true });
    topo.add_edge(a, c, LinkAttrs { cost: 10.0, active: true });

    assert_eq!(
        minimum_spanning_tree_links(&topo),
        hashset! { LinkId::new(a, b), LinkId::new(b, c) }
    );
}
