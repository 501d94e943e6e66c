//! A full agent: client registries plus inbound operation serving.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::{Agent, AgentCore, Connection};
use crate::config::Config;
use crate::error::Result;
use crate::op::Op;
use crate::protocol::{Client, ClientState, OperationHandler, Server, ServerState};
use crate::stanza::{Iq, IqType, StanzaKind};
use crate::synapse::FireReport;

/// What [`Node::handle_stanza`] did with an inbound stanza
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Operation served to completion
    Served(ServerState),
    /// Operation already served recently; only the transport reply was sent
    Duplicate,
    /// Routed to the outstanding client holding the token
    Client,
    /// Not addressed to anything here
    Dropped,
}

/// Agent that both issues and serves operations.
pub struct Node<C> {
    core: AgentCore<C>,
    handler: Box<dyn OperationHandler>,
    /// (requester, token) of recently served operations
    served: VecDeque<(String, String)>,
    dedup_window: usize,
    response_timeout: Option<Duration>,
}

impl<C: Connection> Node<C> {
    /// Build a node from configuration
    pub fn new(config: &Config, connection: C, handler: impl OperationHandler + 'static) -> Self {
        let core = AgentCore::new(config.agent.jid.as_str(), connection)
            .with_drain_mode(config.queue.drain)
            .with_serialization(config.agent.serialize_per_destination);
        Self {
            core,
            handler: Box::new(handler),
            served: VecDeque::with_capacity(config.agent.dedup_window),
            dedup_window: config.agent.dedup_window,
            response_timeout: config.client.response_timeout(),
        }
    }

    /// Own identifier
    pub fn jid(&self) -> &str {
        self.core.jid()
    }

    /// Issue `op` to `to` and try to send it right away. Returns the token.
    pub fn request(&mut self, op: Op, to: &str) -> String {
        let token = Client::start(&mut self.core, op, to);
        self.core.fire();
        token
    }

    /// Process one inbound stanza.
    pub fn handle_stanza(&mut self, iq: &Iq) -> Result<Inbound> {
        let is_operation = iq.kind == IqType::Set
            && iq
                .body()
                .and_then(StanzaKind::from_element)
                .is_some_and(|kind| kind == StanzaKind::Operation);

        let outcome = if is_operation {
            self.serve(iq)?
        } else if iq.kind == IqType::Result {
            tracing::trace!(id = %iq.id, from = ?iq.from, "transport reply");
            Inbound::Dropped
        } else if Client::dispatch(&mut self.core, iq) {
            Inbound::Client
        } else {
            tracing::debug!(id = %iq.id, from = ?iq.from, token = ?iq.token(), "no client for stanza");
            Inbound::Dropped
        };

        if self.core.take_released() {
            self.core.fire();
        }
        Ok(outcome)
    }

    fn serve(&mut self, iq: &Iq) -> Result<Inbound> {
        let mut server = match Server::from_iq(iq) {
            Ok(server) => server,
            Err(e) => {
                tracing::warn!(id = %iq.id, from = ?iq.from, "bouncing undecodable operation: {e}");
                self.core.send_stanza(iq.error_reply());
                return Err(e);
            },
        };
        self.core.send_stanza(iq.reply());

        let key = (server.requester().to_string(), server.token().to_string());
        if self.served.contains(&key) {
            tracing::debug!(token = %key.1, requester = %key.0, "duplicate operation dropped");
            return Ok(Inbound::Duplicate);
        }
        if self.dedup_window > 0 {
            if self.served.len() == self.dedup_window {
                self.served.pop_front();
            }
            self.served.push_back(key);
        }

        tracing::debug!(
            token = %server.token(),
            requester = %server.requester(),
            op_type = %server.op().op_type(),
            "serving operation"
        );
        let state = server.run(&mut self.core, self.handler.as_mut());
        Ok(Inbound::Served(state))
    }

    /// The connection came up or went down. Retries queued requests.
    pub fn connection_changed(&mut self) -> FireReport {
        self.core.fire()
    }

    /// Attempt queued requests
    pub fn fire(&mut self) -> FireReport {
        self.core.fire()
    }

    /// Fail requests that outlived the response timeout, if one is set.
    pub fn expire(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.response_timeout else {
            return 0;
        };
        let expired = self.core.expire_clients(now, timeout);
        if self.core.take_released() {
            self.core.fire();
        }
        expired
    }

    /// Take requests that reached a terminal state
    pub fn take_finished(&mut self) -> Vec<Client> {
        self.core.take_finished()
    }

    /// State of an outstanding request
    pub fn client_state(&self, token: &str) -> Option<ClientState> {
        self.core.client_state(token)
    }

    /// The underlying agent
    pub fn core(&self) -> &AgentCore<C> {
        &self.core
    }

    /// The underlying agent, mutably
    pub fn core_mut(&mut self) -> &mut AgentCore<C> {
        &mut self.core
    }
}
