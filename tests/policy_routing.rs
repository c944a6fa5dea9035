//! Access lists and policy routing configured through router
//! configuration text, driven through a node's forwarding path.

use std::net::Ipv4Addr;
use std::time::Duration;

use ctlplane::config::apply_router_config;
use ctlplane::dataplane::{prefix_to_mask, Direction, ForwardAction, Interface, Medium, Node};
use ctlplane::protocol::ipv4::{proto, Ipv4Builder};
use ctlplane::protocol::tcp::{TcpBuilder, TcpFlags};
use ctlplane::protocol::udp::UdpBuilder;

fn router() -> Node {
    Node::new(
        1,
        vec![
            Interface::new(0, Ipv4Addr::new(10, 0, 1, 1), prefix_to_mask(24), Medium::Wired),
            Interface::new(1, Ipv4Addr::new(10, 0, 2, 1), prefix_to_mask(24), Medium::Wired),
            Interface::new(2, Ipv4Addr::new(10, 0, 3, 1), prefix_to_mask(24), Medium::Wired),
        ],
    )
}

fn udp(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    let payload = UdpBuilder::new().src_port(4000).dst_port(53).build();
    Ipv4Builder::new()
        .protocol(proto::UDP)
        .src_addr(src)
        .dst_addr(dst)
        .payload(&payload)
        .build()
}

fn tcp(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16, flags: TcpFlags) -> Vec<u8> {
    let payload = TcpBuilder::new()
        .src_port(src_port)
        .dst_port(dst_port)
        .flags(flags)
        .build();
    Ipv4Builder::new()
        .protocol(proto::TCP)
        .src_addr(src)
        .dst_addr(dst)
        .payload(&payload)
        .build()
}

fn egress(action: &ForwardAction) -> (usize, Ipv4Addr) {
    match action {
        ForwardAction::Forward {
            interface,
            next_hop,
            ..
        } => (*interface, *next_hop),
        other => panic!("expected forward, got {:?}", other),
    }
}

#[test]
fn test_policy_route_by_source() {
    let text = "\
NODE-IDENTIFIER 1
ACCESS-LIST 1 PERMIT 10.0.1.0 0.0.0.127
INTERFACE 0
IP POLICY ROUTE-MAP steer
ROUTE-MAP steer PERMIT 10
MATCH IP ADDRESS 1
SET IP NEXT-HOP 10.0.3.2
";
    let mut node = router();
    apply_router_config(&mut node, text).unwrap();

    let dst = Ipv4Addr::new(10, 0, 2, 7);
    let steered = node.forward(0, &udp(Ipv4Addr::new(10, 0, 1, 9), dst));
    assert_eq!(egress(&steered), (2, Ipv4Addr::new(10, 0, 3, 2)));

    let normal = node.forward(0, &udp(Ipv4Addr::new(10, 0, 1, 200), dst));
    assert_eq!(egress(&normal), (1, dst));

    let stats = node.policy().pbr.stats.interface(0).unwrap();
    assert_eq!(stats.routed.get(), 1);
    assert_eq!(stats.not_routed.get(), 1);
}

#[test]
fn test_route_map_deny_terminates() {
    let text = "\
NODE-IDENTIFIER 1
ACCESS-LIST 2 PERMIT HOST 10.0.1.7
ROUTE-MAP steer PERMIT 20
MATCH LENGTH 0 1500
SET IP NEXT-HOP 10.0.3.2
ROUTE-MAP steer DENY 10
MATCH IP ADDRESS 2
INTERFACE 0
IP POLICY ROUTE-MAP steer
";
    let mut node = router();
    apply_router_config(&mut node, text).unwrap();

    let dst = Ipv4Addr::new(10, 0, 2, 7);
    // seq 10 denies before seq 20 could permit
    let denied = node.forward(0, &udp(Ipv4Addr::new(10, 0, 1, 7), dst));
    assert_eq!(egress(&denied), (1, dst));

    let steered = node.forward(0, &udp(Ipv4Addr::new(10, 0, 1, 8), dst));
    assert_eq!(egress(&steered), (2, Ipv4Addr::new(10, 0, 3, 2)));
}

#[test]
fn test_deny_entry_by_destination_declines_policy() {
    let text = "\
NODE-IDENTIFIER 1
ACCESS-LIST 101 PERMIT IP ANY 10.0.0.0 0.0.0.255
ROUTE-MAP X DENY 10
MATCH IP ADDRESS 101
ROUTE-MAP X PERMIT 20
MATCH LENGTH 0 65535
SET IP NEXT-HOP 10.0.0.1
INTERFACE 1
IP POLICY ROUTE-MAP X
";
    let mut node = Node::new(
        1,
        vec![
            Interface::new(0, Ipv4Addr::new(10, 0, 0, 254), prefix_to_mask(24), Medium::Wired),
            Interface::new(1, Ipv4Addr::new(10, 1, 0, 1), prefix_to_mask(24), Medium::Wired),
            Interface::new(2, Ipv4Addr::new(10, 2, 0, 1), prefix_to_mask(24), Medium::Wired),
        ],
    );
    apply_router_config(&mut node, text).unwrap();

    // seq 20 would match too, but seq 10 denies first
    let dst = Ipv4Addr::new(10, 0, 0, 5);
    let declined = node.forward(1, &udp(Ipv4Addr::new(10, 1, 0, 9), dst));
    assert_eq!(egress(&declined), (0, dst));

    let steered = node.forward(1, &udp(Ipv4Addr::new(10, 1, 0, 9), Ipv4Addr::new(10, 2, 0, 7)));
    assert_eq!(egress(&steered), (0, Ipv4Addr::new(10, 0, 0, 1)));

    let stats = node.policy().pbr.stats.interface(1).unwrap();
    assert_eq!(stats.routed.get(), 1);
    assert_eq!(stats.not_routed.get(), 1);
}

#[test]
fn test_precedence_kept_when_policy_declines() {
    let text = "\
NODE-IDENTIFIER 1
ROUTE-MAP mark PERMIT 10
MATCH LENGTH 0 1500
SET IP PRECEDENCE critical
INTERFACE 0
IP POLICY ROUTE-MAP mark
";
    let mut node = router();
    apply_router_config(&mut node, text).unwrap();

    let dst = Ipv4Addr::new(10, 0, 2, 7);
    match node.forward(0, &udp(Ipv4Addr::new(10, 0, 1, 9), dst)) {
        ForwardAction::Forward {
            interface, packet, ..
        } => {
            assert_eq!(interface, 1);
            assert_eq!(packet[1] >> 5, 5);
        }
        other => panic!("expected forward, got {:?}", other),
    }

    let pbr = &node.policy().pbr.stats;
    assert_eq!(pbr.precedence_set.get(), 1);
    assert_eq!(pbr.interface(0).map_or(0, |s| s.not_routed.get()), 0);
}

#[test]
fn test_local_policy_route() {
    let text = "\
NODE-IDENTIFIER 1
IP LOCAL POLICY ROUTE-MAP local
ROUTE-MAP local PERMIT 10
MATCH LENGTH 0 1500
SET INTERFACE ethernet 2
";
    let mut node = router();
    apply_router_config(&mut node, text).unwrap();

    let dst = Ipv4Addr::new(10, 0, 2, 7);
    let sent = node.send_local(&udp(Ipv4Addr::new(10, 0, 1, 1), dst));
    assert_eq!(egress(&sent), (2, dst));
    assert_eq!(node.policy().pbr.stats.local.routed.get(), 1);
}

#[test]
fn test_reflexive_session_round_trip() {
    let text = "\
NODE-IDENTIFIER 1
IP REFLEXIVE-LIST TIMEOUT 60
IP ACCESS-LIST EXTENDED outbound
PERMIT TCP ANY ANY REFLECT sessions
PERMIT IP ANY ANY
IP ACCESS-LIST EXTENDED inbound
EVALUATE sessions
DENY IP ANY ANY
INTERFACE 1
IP ACCESS-GROUP outbound OUT
IP ACCESS-GROUP inbound IN
";
    let mut node = router();
    apply_router_config(&mut node, text).unwrap();

    let client = Ipv4Addr::new(10, 0, 1, 9);
    let server = Ipv4Addr::new(10, 0, 2, 7);
    let syn = TcpFlags {
        syn: true,
        ..Default::default()
    };
    let ack = TcpFlags {
        ack: true,
        ..Default::default()
    };

    // nothing gets in before the session exists
    let early = node.forward(1, &tcp(server, 80, client, 40000, ack));
    assert_eq!(
        early,
        ForwardAction::Filtered {
            interface: 1,
            direction: Direction::In
        }
    );

    let opened = node.forward(0, &tcp(client, 40000, server, 80, syn));
    assert_eq!(egress(&opened).0, 1);

    let reply = node.forward(1, &tcp(server, 80, client, 40000, ack));
    assert_eq!(egress(&reply).0, 0);

    // a different port is not part of the session
    let stray = node.forward(1, &tcp(server, 80, client, 40001, ack));
    assert!(matches!(stray, ForwardAction::Filtered { .. }));

    // idle past the timeout closes the session
    while node.step(Duration::from_secs(120)).is_some() {}
    node.advance_to(Duration::from_secs(120));
    let late = node.forward(1, &tcp(server, 80, client, 40000, ack));
    assert!(matches!(late, ForwardAction::Filtered { .. }));
}

#[test]
fn test_config_errors_name_node_and_line() {
    let mut node = router();
    let err = apply_router_config(
        &mut node,
        "NODE-IDENTIFIER 1\nIP ACCESS-LIST STANDARD std\nPERMIT ANY REFLECT nope\n",
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("node 1"));
    assert!(message.contains("PERMIT ANY REFLECT nope"));
}
