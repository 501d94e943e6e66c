//! Client side of an operation exchange.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::op::Op;
use crate::stanza::{elements, Element, Iq, IqType, StanzaKind};
use crate::synapse::{Attempt, Synapse};

/// Client state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    /// Queued, request not yet sent
    New,
    /// Request sent, waiting for ack/nack
    Ready,
    /// Accepted, receiving data
    Consume,
    /// Finished successfully
    Commit,
    /// Finished with an error
    Error,
    /// Refused by the destination
    AuthFail,
}

impl ClientState {
    /// Name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Ready => "ready",
            Self::Consume => "consume",
            Self::Commit => "commit",
            Self::Error => "error",
            Self::AuthFail => "authfail",
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Commit | Self::Error | Self::AuthFail)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outstanding client-initiated request.
#[derive(Debug, Clone)]
pub struct Client {
    state: ClientState,
    op: Op,
    to: String,
    token: String,
    /// Payload reassembled from data stanzas
    buffer: Vec<Element>,
    /// Terminal stanza (nack, final or error)
    result: Option<Element>,
    last_activity: Instant,
}

impl Client {
    pub(crate) fn new(op: Op, to: String, token: String) -> Self {
        Self {
            state: ClientState::New,
            op,
            to,
            token,
            buffer: Vec::new(),
            result: None,
            last_activity: Instant::now(),
        }
    }

    /// Submit `op` to `to`.
    ///
    /// Stamps a fresh token on the op, registers the client with the agent
    /// and enqueues its synapse. Nothing is sent until the agent fires its
    /// queue. Returns the token; the client itself is owned by the agent.
    pub fn start<A: Agent>(agent: &mut A, mut op: Op, to: impl Into<String>) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        op.stamp_token(&token);
        let client = Client::new(op, to.into(), token.clone());
        tracing::debug!(
            token = %token,
            to = %client.to,
            op_type = %client.op.op_type(),
            "client started"
        );

        agent.add_client(client);
        agent.enqueue_synapse(Box::new(ClientSynapse {
            token: token.clone(),
        }));
        token
    }

    /// Route an inbound stanza to the client registered under its token.
    ///
    /// Returns false when no client holds the token, or when the stanza
    /// comes from a sender other than the client's destination. A client
    /// that reaches a terminal state is handed to [`Agent::client_finished`]
    /// instead of being re-registered.
    pub fn dispatch<A: Agent + ?Sized>(agent: &mut A, iq: &Iq) -> bool {
        let Some(token) = iq.body().and_then(|body| agent.parse_token(body)) else {
            return false;
        };
        let Some(mut client) = agent.remove_client(&token) else {
            return false;
        };
        if let Some(from) = iq.from.as_deref().filter(|from| *from != client.to) {
            tracing::warn!(%token, %from, to = %client.to, "stanza from foreign sender dropped");
            agent.add_client(client);
            return false;
        }

        client.receive(agent, iq);
        if client.state.is_terminal() {
            agent.client_finished(client);
        } else {
            agent.add_client(client);
        }
        true
    }

    /// Current state
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Correlation token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Destination
    pub fn destination(&self) -> &str {
        &self.to
    }

    /// The submitted operation
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Data received so far
    pub fn buffer(&self) -> &[Element] {
        &self.buffer
    }

    /// Terminal stanza, once finished
    pub fn result(&self) -> Option<&Element> {
        self.result.as_ref()
    }

    /// Try to transmit the request.
    ///
    /// Defers while the connection is down or the destination is busy.
    pub fn attempt<A: Agent + ?Sized>(&mut self, agent: &mut A) -> Attempt {
        if self.state != ClientState::New {
            tracing::warn!(token = %self.token, state = %self.state, "attempt on a sent request");
            return Attempt::Complete;
        }
        if !agent.connection_is_open_and_authenticated() {
            tracing::debug!(token = %self.token, "deferred: connection not ready");
            return Attempt::Deferred;
        }
        if agent.defer_on_busy_jid(&self.to) {
            tracing::debug!(token = %self.token, to = %self.to, "deferred: destination busy");
            return Attempt::Deferred;
        }

        agent.set_busy_jid(&self.to, &self.token);
        let iq = self.op.to_iq(&self.to, agent.jid());
        tracing::debug!(token = %self.token, to = %self.to, id = %iq.id, "sending operation");
        agent.send_stanza(iq);
        self.transition(ClientState::Ready);
        Attempt::Complete
    }

    /// Feed one inbound stanza through the state machine.
    ///
    /// Stanzas that do not fit the current state are dropped; returns
    /// whether the stanza was consumed.
    pub fn receive<A: Agent + ?Sized>(&mut self, agent: &mut A, iq: &Iq) -> bool {
        if self.state.is_terminal() {
            tracing::warn!(token = %self.token, state = %self.state, "stanza for finished request dropped");
            return false;
        }
        match iq.kind {
            IqType::Set => {},
            IqType::Error => return self.process_bounce(agent, iq),
            IqType::Get | IqType::Result => {
                tracing::trace!(token = %self.token, id = %iq.id, "transport reply ignored");
                return false;
            },
        }
        let Some(stanza) = iq.body() else {
            return false;
        };
        let Some(kind) = StanzaKind::from_element(stanza) else {
            tracing::warn!(token = %self.token, element = %stanza.name, "unknown stanza dropped");
            return false;
        };

        match (self.state, kind) {
            (ClientState::Ready, StanzaKind::Ack | StanzaKind::Nack) => {
                self.process_ack_or_nack(agent, iq, kind, stanza)
            },
            (
                ClientState::Consume,
                StanzaKind::Data | StanzaKind::Result | StanzaKind::Final | StanzaKind::Error,
            ) => self.process_data_or_final(agent, iq, kind, stanza),
            (state, kind) => {
                tracing::warn!(token = %self.token, %state, %kind, "unexpected stanza dropped");
                false
            },
        }
    }

    /// Handle `ack`/`nack` while waiting for the destination's decision.
    pub fn process_ack_or_nack<A: Agent + ?Sized>(
        &mut self,
        agent: &mut A,
        iq: &Iq,
        kind: StanzaKind,
        stanza: &Element,
    ) -> bool {
        let next = match kind {
            StanzaKind::Ack => ClientState::Consume,
            StanzaKind::Nack => ClientState::AuthFail,
            _ => return false,
        };

        agent.send_stanza(iq.reply());
        agent.remove_busy_jid(&self.to, &self.token);
        if next == ClientState::AuthFail {
            self.result = Some(stanza.clone());
        }
        self.transition(next);
        true
    }

    /// Handle streamed `data`/`result` and the terminal `final`/`error`.
    pub fn process_data_or_final<A: Agent + ?Sized>(
        &mut self,
        agent: &mut A,
        iq: &Iq,
        kind: StanzaKind,
        stanza: &Element,
    ) -> bool {
        let next = match kind {
            StanzaKind::Data | StanzaKind::Result => ClientState::Consume,
            StanzaKind::Final => ClientState::Commit,
            StanzaKind::Error => ClientState::Error,
            _ => return false,
        };

        agent.send_stanza(iq.reply());
        if next == ClientState::Consume {
            self.absorb(stanza);
        } else {
            self.result = Some(stanza.clone());
        }
        self.transition(next);
        true
    }

    /// Fail the request if no stanza arrived within `timeout`.
    ///
    /// Only `ready` and `consume` can expire; a held destination is released.
    pub fn expire<A: Agent + ?Sized>(&mut self, agent: &mut A, now: Instant, timeout: Duration) -> bool {
        if !matches!(self.state, ClientState::Ready | ClientState::Consume) {
            return false;
        }
        if now.saturating_duration_since(self.last_activity) < timeout {
            return false;
        }

        tracing::warn!(
            token = %self.token,
            to = %self.to,
            state = %self.state,
            timeout_secs = timeout.as_secs(),
            "request timed out"
        );
        if self.state == ClientState::Ready {
            agent.remove_busy_jid(&self.to, &self.token);
        }
        self.result = Some(elements::error(&self.token).with_text("response timeout"));
        self.transition(ClientState::Error);
        true
    }

    /// Transport bounced one of our stanzas back as `iq type=error`.
    fn process_bounce<A: Agent + ?Sized>(&mut self, agent: &mut A, iq: &Iq) -> bool {
        if !matches!(self.state, ClientState::Ready | ClientState::Consume) {
            return false;
        }
        if self.state == ClientState::Ready {
            agent.remove_busy_jid(&self.to, &self.token);
        }
        self.result = Some(
            iq.body()
                .cloned()
                .unwrap_or_else(|| elements::error(&self.token).with_text("transport error")),
        );
        self.transition(ClientState::Error);
        true
    }

    fn absorb(&mut self, stanza: &Element) {
        if stanza.children.is_empty() {
            if let Some(text) = stanza.text.as_deref().filter(|t| !t.is_empty()) {
                self.buffer.push(elements::res(text, None));
            }
        } else {
            self.buffer.extend(stanza.children.iter().cloned());
        }
    }

    fn transition(&mut self, next: ClientState) {
        let prev = self.state;
        self.state = next;
        self.last_activity = Instant::now();
        if next.is_terminal() {
            tracing::info!(token = %self.token, to = %self.to, %prev, state = %next, "request finished");
        } else if prev != next {
            tracing::debug!(token = %self.token, %prev, state = %next, "client transition");
        }
    }
}

/// Queue entry that transmits a client's request once it may.
struct ClientSynapse {
    token: String,
}

impl<A: Agent> Synapse<A> for ClientSynapse {
    fn attempt(&mut self, agent: &mut A) -> Attempt {
        let Some(mut client) = agent.remove_client(&self.token) else {
            tracing::debug!(token = %self.token, "client gone before send");
            return Attempt::Complete;
        };
        let outcome = client.attempt(agent);
        agent.add_client(client);
        outcome
    }

    fn label(&self) -> &str {
        &self.token
    }
}
