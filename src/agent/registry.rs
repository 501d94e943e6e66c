//! Concrete agent owning the busy-peer and client registries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{Agent, Connection};
use crate::protocol::{Client, ClientState};
use crate::stanza::Iq;
use crate::synapse::{BoxedSynapse, DrainMode, FireReport, SynapseQueue};

/// Agent state: identity, connection, registries and the synapse queue.
pub struct AgentCore<C> {
    jid: String,
    connection: C,
    serialize_per_destination: bool,
    /// destination → token of the client holding it
    busy: HashMap<String, String>,
    clients: HashMap<String, Client>,
    finished: Vec<Client>,
    queue: SynapseQueue<AgentCore<C>>,
    released: bool,
}

impl<C: Connection> AgentCore<C> {
    /// Create an agent identified as `jid`
    pub fn new(jid: impl Into<String>, connection: C) -> Self {
        Self {
            jid: jid.into(),
            connection,
            serialize_per_destination: true,
            busy: HashMap::new(),
            clients: HashMap::new(),
            finished: Vec::new(),
            queue: SynapseQueue::new(),
            released: false,
        }
    }

    /// Set how much one fire drains
    pub fn with_drain_mode(mut self, mode: DrainMode) -> Self {
        self.queue = std::mem::take(&mut self.queue).with_mode(mode);
        self
    }

    /// Enable or disable the busy-peer lock
    pub fn with_serialization(mut self, enabled: bool) -> Self {
        self.serialize_per_destination = enabled;
        self
    }

    /// Attempt queued synapses against this agent.
    ///
    /// Synapses enqueued while firing land behind the existing entries.
    pub fn fire(&mut self) -> FireReport {
        let mut queue = std::mem::take(&mut self.queue);
        let report = queue.fire(self);
        queue.append(&mut self.queue);
        self.queue = queue;
        report
    }

    /// Fail requests silent for longer than `timeout`; returns how many
    pub fn expire_clients(&mut self, now: Instant, timeout: Duration) -> usize {
        let tokens: Vec<String> = self.clients.keys().cloned().collect();
        let mut expired = 0;
        for token in tokens {
            let Some(mut client) = self.clients.remove(&token) else {
                continue;
            };
            if client.expire(self, now, timeout) {
                expired += 1;
                self.client_finished(client);
            } else {
                self.clients.insert(token, client);
            }
        }
        expired
    }

    /// Whether a busy destination was released since the last call
    pub fn take_released(&mut self) -> bool {
        std::mem::take(&mut self.released)
    }

    /// Take clients that reached a terminal state
    pub fn take_finished(&mut self) -> Vec<Client> {
        std::mem::take(&mut self.finished)
    }

    /// State of an outstanding client
    pub fn client_state(&self, token: &str) -> Option<ClientState> {
        self.clients.get(token).map(Client::state)
    }

    /// Outstanding client by token
    pub fn client(&self, token: &str) -> Option<&Client> {
        self.clients.get(token)
    }

    /// Number of outstanding clients
    pub fn outstanding(&self) -> usize {
        self.clients.len()
    }

    /// Token of the client holding `jid`
    pub fn busy_holder(&self, jid: &str) -> Option<&str> {
        self.busy.get(jid).map(String::as_str)
    }

    /// The synapse queue
    pub fn queue(&self) -> &SynapseQueue<AgentCore<C>> {
        &self.queue
    }

    /// The connection
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// The connection, mutably
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }
}

impl<C: Connection> Agent for AgentCore<C> {
    fn jid(&self) -> &str {
        &self.jid
    }

    fn connection_is_open_and_authenticated(&self) -> bool {
        self.connection.is_open_and_authenticated()
    }

    fn defer_on_busy_jid(&self, jid: &str) -> bool {
        self.serialize_per_destination && self.busy.contains_key(jid)
    }

    fn set_busy_jid(&mut self, jid: &str, token: &str) {
        if !self.serialize_per_destination {
            return;
        }
        if let Some(holder) = self.busy.insert(jid.to_string(), token.to_string()) {
            tracing::warn!(%jid, %holder, %token, "busy destination taken over");
        }
    }

    fn remove_busy_jid(&mut self, jid: &str, token: &str) {
        if self.busy.get(jid).is_some_and(|holder| holder == token) {
            self.busy.remove(jid);
            self.released = true;
            tracing::trace!(%jid, %token, "destination released");
        }
    }

    fn add_client(&mut self, client: Client) {
        self.clients.insert(client.token().to_string(), client);
    }

    fn remove_client(&mut self, token: &str) -> Option<Client> {
        self.clients.remove(token)
    }

    fn send_stanza(&mut self, iq: Iq) {
        tracing::trace!(id = %iq.id, to = ?iq.to, kind = iq.kind.as_str(), "send");
        self.connection.send(iq);
    }

    fn enqueue_synapse(&mut self, synapse: BoxedSynapse<Self>) {
        self.queue.enqueue(synapse);
    }

    fn client_finished(&mut self, client: Client) {
        self.finished.push(client);
    }
}
