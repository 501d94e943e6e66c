//! End-to-end operation exchange tests.
//!
//! Several nodes share an in-memory bus; stanzas are delivered by
//! destination until no node has anything left to send.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vertebra::stanza::elements;
use vertebra::{
    Client, ClientState, Config, Inbound, Iq, IqType, LoopbackConnection, Node, Op, Responder,
    Router, ServerState, StanzaKind,
};

const ALICE: &str = "alice@cluster";
const HOST: &str = "host@cluster";

struct Bus {
    nodes: Vec<Node<LoopbackConnection>>,
    /// Stanzas in delivery order
    log: Vec<Iq>,
}

impl Bus {
    fn new(nodes: Vec<Node<LoopbackConnection>>) -> Self {
        Self {
            nodes,
            log: Vec::new(),
        }
    }

    fn node(&mut self, jid: &str) -> &mut Node<LoopbackConnection> {
        self.nodes.iter_mut().find(|n| n.jid() == jid).unwrap()
    }

    /// Deliver until quiet; returns the number of stanzas delivered
    fn pump(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let outbound: Vec<Iq> = self
                .nodes
                .iter_mut()
                .flat_map(|n| n.core_mut().connection_mut().drain())
                .collect();
            if outbound.is_empty() {
                return delivered;
            }
            for iq in outbound {
                let to = iq.to.clone().unwrap_or_default();
                if let Some(node) = self.nodes.iter_mut().find(|n| n.jid() == to) {
                    node.handle_stanza(&iq).unwrap();
                    delivered += 1;
                }
                self.log.push(iq);
            }
        }
    }

    fn position(&self, kind: StanzaKind, token: &str) -> Option<usize> {
        self.log.iter().position(|iq| {
            iq.kind == IqType::Set
                && iq.token() == Some(token)
                && iq.body().and_then(StanzaKind::from_element) == Some(kind)
        })
    }
}

fn config(jid: &str) -> Config {
    let mut config = Config::default();
    config.agent.jid = jid.to_string();
    config
}

fn client_node(jid: &str) -> Node<LoopbackConnection> {
    Node::new(&config(jid), LoopbackConnection::open(), Router::new())
}

fn host_router() -> Router {
    Router::new()
        .route("/gem", |op: &Op, _from: &str, out: &mut Responder<'_>| {
            let filter = op.arg("filter").map_or("", |v| v.as_str()).to_string();
            let mut count = 0;
            for gem in ["rake", "rails", "rack"] {
                if gem.starts_with(&filter) {
                    out.value("gem", gem);
                    count += 1;
                }
            }
            Ok(vec![elements::res(&count.to_string(), Some("count"))])
        })
        .route("/gem/install", |_op: &Op, _from: &str, _out: &mut Responder<'_>| {
            Ok(vec![elements::res("installed", Some("status"))])
        })
        .route("/broken", |_op: &Op, _from: &str, _out: &mut Responder<'_>| {
            Err("disk full".to_string())
        })
}

fn host_node() -> Node<LoopbackConnection> {
    Node::new(&config(HOST), LoopbackConnection::open(), host_router())
}

fn finished(node: &mut Node<LoopbackConnection>, token: &str) -> Client {
    node.take_finished()
        .into_iter()
        .find(|c| c.token() == token)
        .unwrap()
}

/// Test a granted operation streams data and commits
#[test]
fn test_operation_commits_with_streamed_data() {
    let mut bus = Bus::new(vec![client_node(ALICE), host_node()]);
    let op = Op::builder("/gem/list").arg("filter", "ra").build().unwrap();
    let token = bus.node(ALICE).request(op, HOST);

    assert!(bus.pump() > 0);

    let client = finished(bus.node(ALICE), &token);
    assert_eq!(client.state(), ClientState::Commit);
    let gems: Vec<&str> = client.buffer().iter().map(|el| el.text()).collect();
    assert_eq!(gems, ["rake", "rails", "rack"]);
    let result = client.result().unwrap();
    assert_eq!(result.name, "final");
    assert_eq!(result.children[0].text(), "3");

    // every set was mirrored by a result with the same id
    let sets: Vec<&Iq> = bus.log.iter().filter(|iq| iq.kind == IqType::Set).collect();
    for set in sets {
        assert!(bus
            .log
            .iter()
            .any(|iq| iq.kind == IqType::Result && iq.id == set.id));
    }
}

/// Test an operation nobody handles ends in authfail
#[test]
fn test_unknown_operation_is_nacked() {
    let mut bus = Bus::new(vec![client_node(ALICE), host_node()]);
    let token = bus.node(ALICE).request(Op::new("/cloud/start").unwrap(), HOST);
    bus.pump();

    let client = finished(bus.node(ALICE), &token);
    assert_eq!(client.state(), ClientState::AuthFail);
    assert_eq!(client.result().unwrap().text(), "no handler for /cloud/start");
    assert!(bus.position(StanzaKind::Final, &token).is_none());
}

/// Test the most specific route wins
#[test]
fn test_longest_route_wins() {
    let mut bus = Bus::new(vec![client_node(ALICE), host_node()]);
    let token = bus
        .node(ALICE)
        .request(Op::new("/gem/install/rake").unwrap(), HOST);
    bus.pump();

    let client = finished(bus.node(ALICE), &token);
    assert_eq!(client.state(), ClientState::Commit);
    assert_eq!(client.result().unwrap().children[0].text(), "installed");
}

/// Test a failing action reports error with its message
#[test]
fn test_failed_operation_reports_error() {
    let mut bus = Bus::new(vec![client_node(ALICE), host_node()]);
    let token = bus.node(ALICE).request(Op::new("/broken").unwrap(), HOST);
    bus.pump();

    let client = finished(bus.node(ALICE), &token);
    assert_eq!(client.state(), ClientState::Error);
    assert_eq!(client.result().unwrap().text(), "disk full");
}

/// Test a second request to the same destination waits for the first ack
#[test]
fn test_requests_to_same_destination_are_serialized() {
    let mut bus = Bus::new(vec![client_node(ALICE), host_node()]);
    let first = bus.node(ALICE).request(Op::new("/gem/list").unwrap(), HOST);
    let second = bus.node(ALICE).request(Op::new("/gem/list").unwrap(), HOST);

    let alice = bus.node(ALICE);
    assert_eq!(alice.core().connection().sent().len(), 1);
    assert_eq!(alice.client_state(&second), Some(ClientState::New));
    assert_eq!(alice.core().busy_holder(HOST), Some(first.as_str()));

    bus.pump();

    let first_ack = bus.position(StanzaKind::Ack, &first).unwrap();
    let second_op = bus.position(StanzaKind::Operation, &second).unwrap();
    assert!(first_ack < second_op);

    let done = bus.node(ALICE).take_finished();
    assert_eq!(done.len(), 2);
    assert!(done.iter().all(|c| c.state() == ClientState::Commit));
    assert_eq!(bus.node(ALICE).core().busy_holder(HOST), None);
}

/// Test requests to different destinations do not wait on each other
#[test]
fn test_different_destinations_are_independent() {
    let other = config("other@cluster");
    let mut bus = Bus::new(vec![
        client_node(ALICE),
        host_node(),
        Node::new(&other, LoopbackConnection::open(), host_router()),
    ]);

    bus.node(ALICE).request(Op::new("/gem/list").unwrap(), HOST);
    bus.node(ALICE)
        .request(Op::new("/gem/list").unwrap(), "other@cluster");
    assert_eq!(bus.node(ALICE).core().connection().sent().len(), 2);

    bus.pump();
    assert_eq!(bus.node(ALICE).take_finished().len(), 2);
}

/// Test nothing is sent until the connection is up
#[test]
fn test_request_waits_for_connection() {
    let alice = Node::new(&config(ALICE), LoopbackConnection::closed(), Router::new());
    let mut bus = Bus::new(vec![alice, host_node()]);

    let token = bus.node(ALICE).request(Op::new("/gem/list").unwrap(), HOST);
    assert_eq!(bus.pump(), 0);
    assert_eq!(bus.node(ALICE).client_state(&token), Some(ClientState::New));

    let alice = bus.node(ALICE);
    alice.core_mut().connection_mut().open = true;
    let report = alice.connection_changed();
    assert_eq!(report.completed, 1);

    bus.pump();
    assert_eq!(finished(bus.node(ALICE), &token).state(), ClientState::Commit);
}

/// Test a retransmitted operation is executed only once
#[test]
fn test_duplicate_operation_served_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let router = Router::new().route("/count", move |_op: &Op, _from: &str, _out: &mut Responder<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    });
    let mut host = Node::new(&config(HOST), LoopbackConnection::open(), router);
    let mut alice = client_node(ALICE);

    alice.request(Op::new("/count").unwrap(), HOST);
    let op_iq = alice.core_mut().connection_mut().drain().remove(0);

    assert_eq!(
        host.handle_stanza(&op_iq).unwrap(),
        Inbound::Served(ServerState::Committed)
    );
    host.core_mut().connection_mut().drain();

    assert_eq!(host.handle_stanza(&op_iq).unwrap(), Inbound::Duplicate);
    let resent = host.core_mut().connection_mut().drain();
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0].kind, IqType::Result);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Test an unanswered request times out and frees its destination
#[test]
fn test_silent_destination_times_out() {
    let mut cfg = config(ALICE);
    cfg.client.response_timeout_secs = 5;
    let mut alice = Node::new(&cfg, LoopbackConnection::open(), Router::new());

    let first = alice.request(Op::new("/gem/list").unwrap(), "gone@cluster");
    let second = alice.request(Op::new("/gem/list").unwrap(), "gone@cluster");
    assert_eq!(alice.core_mut().connection_mut().drain().len(), 1);

    assert_eq!(alice.expire(Instant::now()), 0);
    assert_eq!(alice.expire(Instant::now() + Duration::from_secs(6)), 1);

    let client = finished(&mut alice, &first);
    assert_eq!(client.state(), ClientState::Error);
    assert_eq!(client.result().unwrap().text(), "response timeout");

    // the freed destination lets the queued request go out
    assert_eq!(alice.client_state(&second), Some(ClientState::Ready));
    assert_eq!(alice.core().connection().sent().len(), 1);
}

/// Test a bounced request moves the client to error
#[test]
fn test_bounced_request_fails_client() {
    let mut alice = client_node(ALICE);
    let token = alice.request(Op::new("/gem/list").unwrap(), "nobody@cluster");
    let sent = alice.core_mut().connection_mut().drain().remove(0);

    let mut bounce = sent.reply();
    bounce.kind = IqType::Error;
    assert_eq!(alice.handle_stanza(&bounce).unwrap(), Inbound::Client);

    let client = finished(&mut alice, &token);
    assert_eq!(client.state(), ClientState::Error);
    assert!(alice.core().connection().sent().is_empty());
    assert_eq!(alice.core().busy_holder("nobody@cluster"), None);
}

/// Test stanzas for finished exchanges are dropped
#[test]
fn test_late_stanza_after_commit_dropped() {
    let mut bus = Bus::new(vec![client_node(ALICE), host_node()]);
    let token = bus.node(ALICE).request(Op::new("/gem/list").unwrap(), HOST);
    bus.pump();
    finished(bus.node(ALICE), &token);

    let late = Iq::set(ALICE, HOST).with_body(elements::data(&token));
    assert_eq!(bus.node(ALICE).handle_stanza(&late).unwrap(), Inbound::Dropped);
}
