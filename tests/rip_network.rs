//! RIPv2 networks built from a node file and run in simulated time.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ctlplane::config::{self, Config};
use ctlplane::dataplane::{
    prefix_to_mask, ForwardAction, ForwardingTable, Interface, Medium, Network, Node, RipDatagram,
    RipInterfaceSettings, RipSettings, SplitHorizon,
};
use ctlplane::protocol::ipv4::{proto, Ipv4Builder};
use ctlplane::protocol::rip::{RipBuilder, RipCommand, RipVersion, Rte, RIP_MULTICAST};
use ctlplane::protocol::udp::UdpBuilder;
use ctlplane::telemetry::ACCESS_LIST_TRACE_FILE;

/// Three routers in a line:
/// 10.9.0.0/24 - r1 - 10.0.0.0/24 - r2 - 10.1.0.0/24 - r3
const LINE: &str = r#"
[simulation]
seed = 11

[[node]]
id = 1
rip-version = 2

[[node.interface]]
index = 0
address = "10.0.0.1/24"

[[node.interface]]
index = 1
address = "10.9.0.1/24"

[[node]]
id = 2
rip-version = 2
split-horizon = "poisoned-reverse"

[[node.interface]]
index = 0
address = "10.0.0.2/24"

[[node.interface]]
index = 1
address = "10.1.0.1/24"

[[node]]
id = 3
rip-version = 2

[[node.interface]]
index = 0
address = "10.1.0.2/24"
"#;

fn network(text: &str, base_dir: &Path) -> Network {
    let config: Config = toml::from_str(text).unwrap();
    let resolved = config::resolve(&config).unwrap();
    let mut network = config::build_network(&resolved, base_dir).unwrap();
    network.start();
    network
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ctlplane-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_line_of_routers_converges() {
    let mut net = network(LINE, Path::new("."));
    net.run_until(Duration::from_secs(90));

    let r3 = net.node(3).unwrap();
    let far = r3.rip().unwrap().route(Ipv4Addr::new(10, 9, 0, 0)).unwrap();
    assert_eq!(far.metric, 2);
    assert_eq!(far.next_hop, Ipv4Addr::new(10, 1, 0, 1));

    let r1 = net.node(1).unwrap();
    let back = r1.rip().unwrap().route(Ipv4Addr::new(10, 1, 0, 0)).unwrap();
    assert_eq!(back.metric, 1);

    // the learned route is usable for forwarding
    let payload = UdpBuilder::new().src_port(1000).dst_port(2000).build();
    let packet = Ipv4Builder::new()
        .protocol(proto::UDP)
        .src_addr(Ipv4Addr::new(10, 1, 0, 50))
        .dst_addr(Ipv4Addr::new(10, 9, 0, 5))
        .payload(&payload)
        .build();
    let r3 = net.node_mut(3).unwrap();
    match r3.forward(0, &packet) {
        ForwardAction::Forward {
            interface,
            next_hop,
            ..
        } => {
            assert_eq!(interface, 0);
            assert_eq!(next_hop, Ipv4Addr::new(10, 1, 0, 1));
        }
        other => panic!("expected forward, got {:?}", other),
    }

    let stats = net.node(2).unwrap().export_stats();
    let responses = stats
        .iter()
        .find(|(name, _)| name == "rip_responses_received")
        .map(|(_, v)| *v)
        .unwrap();
    assert!(responses > 0);
}

#[test]
fn test_same_seed_runs_identically() {
    let mut a = network(LINE, Path::new("."));
    let mut b = network(LINE, Path::new("."));
    assert_eq!(
        a.run_until(Duration::from_secs(200)),
        b.run_until(Duration::from_secs(200))
    );
    assert_eq!(a.datagrams_delivered(), b.datagrams_delivered());
}

#[test]
fn test_lost_network_is_withdrawn() {
    let mut net = network(LINE, Path::new("."));
    net.run_until(Duration::from_secs(90));
    assert!(net.node(3).unwrap().rip().unwrap().route(Ipv4Addr::new(10, 9, 0, 0)).is_some());

    net.node_mut(1).unwrap().set_interface_status(1, false).unwrap();
    net.run_until(Duration::from_secs(120));

    let r3 = net.node(3).unwrap();
    let lost = r3.rip().unwrap().route(Ipv4Addr::new(10, 9, 0, 0));
    assert!(lost.is_none_or(|r| r.metric >= 16));
    assert!(r3.fib().lookup(Ipv4Addr::new(10, 9, 0, 5)).is_none());
}

#[test]
fn test_inbound_access_list_blocks_rip() {
    let dir = scratch_dir("acl");
    std::fs::write(
        dir.join("router.cfg"),
        "\
NODE-IDENTIFIER 3
ACCESS-LIST 1 DENY HOST 10.1.0.1
ACCESS-LIST 1 PERMIT ANY
INTERFACE 0
IP ACCESS-GROUP 1 IN
",
    )
    .unwrap();

    let mut config: Config = toml::from_str(LINE).unwrap();
    config.simulation.trace_dir = Some(dir.to_string_lossy().into_owned());
    let r3 = config.nodes.iter_mut().find(|n| n.id == 3).unwrap();
    r3.router_config = Some("router.cfg".to_string());
    r3.access_list_trace = Some(true);

    let resolved = config::resolve(&config).unwrap();
    let mut net = config::build_network(&resolved, &dir).unwrap();
    net.start();
    net.run_until(Duration::from_secs(90));

    let r3 = net.node(3).unwrap();
    assert!(r3.rip().unwrap().route(Ipv4Addr::new(10, 9, 0, 0)).is_none());
    let drops = r3.policy().acl.stats.interface(0).unwrap();
    assert!(drops.inbound.standard_deny.get() > 0);

    let trace = std::fs::read_to_string(dir.join(ACCESS_LIST_TRACE_FILE)).unwrap();
    assert!(trace.lines().count() > 0);
    assert!(trace.contains("10.1.0.1"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_two_interface_router_learns_from_response() {
    let mut node = Node::new(
        1,
        vec![
            Interface::new(0, Ipv4Addr::new(10, 0, 1, 1), prefix_to_mask(24), Medium::Wired),
            Interface::new(1, Ipv4Addr::new(10, 0, 2, 1), prefix_to_mask(24), Medium::Wired),
        ],
    );
    node.enable_rip(
        RipSettings {
            version: RipVersion::V2,
            split_horizon: SplitHorizon::Simple,
            border_router: false,
            interfaces: vec![
                RipInterfaceSettings {
                    active: true,
                    ..Default::default()
                };
                2
            ],
        },
        5,
    );
    node.start();

    // startup request, then one regular update cycle
    let until = Duration::from_secs(40);
    let mut sent = Vec::new();
    while let Some(datagrams) = node.step(until) {
        sent.extend(datagrams);
    }
    node.advance_to(until);
    let rip = node.rip().unwrap();
    assert_eq!(rip.stats.requests_sent.get(), 2);
    assert_eq!(rip.stats.regular_update_events.get(), 1);
    assert!(!sent.is_empty());

    let connected: Vec<_> = rip
        .routes()
        .iter()
        .map(|r| (r.destination, r.metric))
        .collect();
    assert_eq!(
        connected,
        vec![(Ipv4Addr::new(10, 0, 1, 0), 0), (Ipv4Addr::new(10, 0, 2, 0), 0)]
    );

    // one RTE heard on the second interface; a neighbor metric of 2
    // installs as 3
    let response = RipBuilder::new(RipCommand::Response, RipVersion::V2)
        .entry(Rte::route(
            Ipv4Addr::new(20, 0, 0, 0),
            prefix_to_mask(24),
            Ipv4Addr::UNSPECIFIED,
            2,
            0,
        ))
        .build();
    let pending = node.pending_events();
    node.receive_rip(&RipDatagram {
        interface: 1,
        src: Ipv4Addr::new(10, 0, 2, 2),
        dst: RIP_MULTICAST,
        payload: response,
    });

    let now = node.now();
    let learned = node.rip().unwrap().route(Ipv4Addr::new(20, 0, 0, 0)).unwrap();
    assert_eq!(learned.metric, 3);
    assert_eq!(learned.learned, 1);
    assert_eq!(learned.next_hop, Ipv4Addr::new(10, 0, 2, 2));
    assert_eq!(learned.timeout, now + Duration::from_secs(180));
    assert_eq!(node.rip().unwrap().routes().len(), 3);
    assert!(node.pending_events() > pending);
    assert!(node.fib().lookup(Ipv4Addr::new(20, 0, 0, 9)).is_some());
}
