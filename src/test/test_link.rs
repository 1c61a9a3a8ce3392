use crate::link::{Link, LinkConfig, Terminal, Transmission};
use crate::{DeviceError, RouterId};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

/// Link between R0 (interface 0) and R1 (interface 1)
fn bound_link(bandwidth: f64, loss_rate: f64) -> Link {
    let mut link = Link::new(LinkConfig::new(bandwidth).loss_rate(loss_rate)).unwrap();
    link.connect(
        Terminal {
            router: RouterId(0),
            iface: 0,
        },
        Terminal {
            router: RouterId(1),
            iface: 1,
        },
    )
    .unwrap();
    link
}

#[test]
fn test_invalid_config() {
    assert_eq!(
        Link::new(LinkConfig::new(0.0)).unwrap_err(),
        DeviceError::InvalidBandwidth(0.0)
    );
    assert_eq!(
        Link::new(LinkConfig::new(-5.0)).unwrap_err(),
        DeviceError::InvalidBandwidth(-5.0)
    );
    assert_eq!(
        Link::new(LinkConfig::new(100.0).loss_rate(1.5)).unwrap_err(),
        DeviceError::InvalidLossRate(1.5)
    );
}

#[test]
fn test_bind_exactly_once() {
    let mut link = bound_link(100.0, 0.0);
    let before = link.terminals().unwrap();
    let result = link.connect(
        Terminal {
            router: RouterId(2),
            iface: 0,
        },
        Terminal {
            router: RouterId(3),
            iface: 0,
        },
    );
    assert_eq!(result, Err(DeviceError::LinkAlreadyBound));
    // the original binding is untouched
    assert_eq!(link.terminals().unwrap(), before);
    assert_eq!(link.id().unwrap(), crate::LinkId::new(RouterId(0), RouterId(1)));
}

#[test]
fn test_delivery() {
    let mut link = bound_link(100.0, 0.0);
    let mut rng = rng();
    let result = link.transmit(RouterId(0), 40, 0.0, &mut rng).unwrap();
    assert_eq!(
        result,
        Transmission::Delivered {
            to: RouterId(1),
            iface: 1,
            at: 0.0
        }
    );
    // the opposite direction arrives on interface 0
    let result = link.transmit(RouterId(1), 40, 0.0, &mut rng).unwrap();
    assert_eq!(
        result,
        Transmission::Delivered {
            to: RouterId(0),
            iface: 0,
            at: 0.0
        }
    );
}

#[test]
fn test_delay() {
    let mut link = Link::new(LinkConfig::new(100.0).delay(0.5)).unwrap();
    link.connect(
        Terminal {
            router: RouterId(0),
            iface: 0,
        },
        Terminal {
            router: RouterId(1),
            iface: 0,
        },
    )
    .unwrap();
    let result = link.transmit(RouterId(0), 10, 2.0, &mut rng()).unwrap();
    assert_eq!(
        result,
        Transmission::Delivered {
            to: RouterId(1),
            iface: 0,
            at: 2.5
        }
    );
}

#[test]
fn test_not_a_terminal() {
    let mut link = bound_link(100.0, 0.0);
    assert_eq!(
        link.transmit(RouterId(9), 10, 0.0, &mut rng()),
        Err(DeviceError::NotATerminal(RouterId(9)))
    );
}

#[test]
fn test_capacity_gate() {
    let mut link = bound_link(100.0, 0.0);
    let mut rng = rng();
    // 60 bits fit
    assert!(matches!(
        link.transmit(RouterId(0), 60, 0.0, &mut rng).unwrap(),
        Transmission::Delivered { .. }
    ));
    // another 60 would exceed the window: dropped, not queued
    assert_eq!(
        link.transmit(RouterId(0), 60, 0.0, &mut rng).unwrap(),
        Transmission::Dropped
    );
    assert_eq!(
        link.transmit(RouterId(0), 60, 0.0, &mut rng).unwrap(),
        Transmission::Dropped
    );
    // exactly one drop counted per refusal
    assert_eq!(link.sample_dropped_packets(true), 2);
    assert_eq!(link.sample_dropped_packets(false), 0);
}

#[test]
fn test_window_reset() {
    let mut link = bound_link(100.0, 0.0);
    let mut rng = rng();
    assert!(matches!(
        link.transmit(RouterId(0), 60, 0.0, &mut rng).unwrap(),
        Transmission::Delivered { .. }
    ));
    // a fitting packet after the window elapsed resets the usage
    assert!(matches!(
        link.transmit(RouterId(0), 30, 2.0, &mut rng).unwrap(),
        Transmission::Delivered { .. }
    ));
    assert_eq!(link.sample_throughput(false), 0);
    // the full window is available again
    assert!(matches!(
        link.transmit(RouterId(0), 90, 2.5, &mut rng).unwrap(),
        Transmission::Delivered { .. }
    ));
}

#[test]
fn test_loss_rate_one() {
    let mut link = bound_link(1_000_000.0, 1.0);
    let mut rng = rng();
    for _ in 0..20 {
        assert_eq!(
            link.transmit(RouterId(0), 10, 0.0, &mut rng).unwrap(),
            Transmission::Lost
        );
    }
    // loss is not a drop
    assert_eq!(link.sample_dropped_packets(false), 0);
}

#[test]
fn test_loss_rate_zero() {
    let mut link = bound_link(1_000_000.0, 0.0);
    let mut rng = rng();
    for _ in 0..20 {
        assert!(matches!(
            link.transmit(RouterId(0), 10, 0.0, &mut rng).unwrap(),
            Transmission::Delivered { .. }
        ));
    }
}

#[test]
fn test_inactive_link() {
    let mut link = bound_link(100.0, 0.0);
    link.deactivate();
    link.deactivate();
    assert_eq!(
        link.transmit(RouterId(0), 10, 0.0, &mut rng()).unwrap(),
        Transmission::Inactive
    );
    // refusing on an inactive link is not a drop
    assert_eq!(link.sample_dropped_packets(false), 0);
    link.activate();
    assert!(matches!(
        link.transmit(RouterId(0), 10, 0.0, &mut rng()).unwrap(),
        Transmission::Delivered { .. }
    ));
}
