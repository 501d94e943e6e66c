//! The hosting agent.
//!
//! The protocol state machines never own transport or registries. They talk
//! to an [`Agent`], which owns:
//!
//! - the **busy-peer registry** (destination → token of the client holding
//!   the destination's single in-flight slot)
//! - the **client registry** (token → outstanding [`Client`])
//! - the [`SynapseQueue`](crate::synapse::SynapseQueue) of pending attempts
//! - the send primitive
//!
//! Mutation points are tied to client transitions:
//!
//! | Transition            | Registry effect                      |
//! |-----------------------|--------------------------------------|
//! | `start`               | client added, synapse enqueued       |
//! | `new → ready`         | destination marked busy              |
//! | `ready → consume`     | destination released                 |
//! | `ready → authfail`    | destination released, client removed |
//! | `consume → commit`    | client removed                       |
//! | `consume → error`     | client removed                       |
//!
//! [`AgentCore`] is the concrete implementation; [`Node`] adds the server
//! side and inbound routing; [`runtime`] runs a `Node` as a tokio task.

mod node;
mod registry;
pub mod runtime;

pub use node::{Inbound, Node};
pub use registry::AgentCore;

use crate::protocol::Client;
use crate::stanza::{elements, Element, Iq};
use crate::synapse::BoxedSynapse;

/// What the protocol core requires from its host.
pub trait Agent {
    /// Own identifier
    fn jid(&self) -> &str;

    /// Whether the transport can carry stanzas right now
    fn connection_is_open_and_authenticated(&self) -> bool;

    /// Whether a request to `jid` must wait because another is in flight
    fn defer_on_busy_jid(&self, jid: &str) -> bool;

    /// Mark `jid` busy on behalf of the client holding `token`
    fn set_busy_jid(&mut self, jid: &str, token: &str);

    /// Release `jid` if the client holding `token` owns it
    fn remove_busy_jid(&mut self, jid: &str, token: &str);

    /// Register an outstanding client under its token
    fn add_client(&mut self, client: Client);

    /// Deregister and return the client holding `token`
    fn remove_client(&mut self, token: &str) -> Option<Client>;

    /// Hand a stanza to the transport
    fn send_stanza(&mut self, iq: Iq);

    /// Queue a synapse for a later `fire`
    fn enqueue_synapse(&mut self, synapse: BoxedSynapse<Self>)
    where
        Self: Sized;

    /// Correlation token of a body element
    fn parse_token(&self, node: &Element) -> Option<String> {
        elements::token(node)
            .filter(|t| !t.is_empty())
            .map(String::from)
    }

    /// Completion notification: `client` reached a terminal state
    fn client_finished(&mut self, client: Client) {
        tracing::debug!(token = client.token(), state = %client.state(), "client finished");
    }
}

/// Transport collaborator: connection state and the send primitive.
pub trait Connection: Send {
    /// Whether the connection is up and authenticated
    fn is_open_and_authenticated(&self) -> bool;

    /// Send a stanza. Delivery is best-effort.
    fn send(&mut self, iq: Iq);
}

/// In-memory connection that records every stanza sent.
#[derive(Debug, Default)]
pub struct LoopbackConnection {
    /// Connection state reported to the agent
    pub open: bool,
    sent: Vec<Iq>,
}

impl LoopbackConnection {
    /// Create an open connection
    pub fn open() -> Self {
        Self {
            open: true,
            sent: Vec::new(),
        }
    }

    /// Create a closed connection
    pub fn closed() -> Self {
        Self::default()
    }

    /// Stanzas sent so far
    pub fn sent(&self) -> &[Iq] {
        &self.sent
    }

    /// Take all stanzas sent so far
    pub fn drain(&mut self) -> Vec<Iq> {
        std::mem::take(&mut self.sent)
    }
}

impl Connection for LoopbackConnection {
    fn is_open_and_authenticated(&self) -> bool {
        self.open
    }

    fn send(&mut self, iq: Iq) {
        self.sent.push(iq);
    }
}
