//! Server side of an operation exchange.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::{Result, VertebraError};
use crate::op::Op;
use crate::stanza::{elements, Element, Iq};

/// Server state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    /// Operation received, not yet authorized
    Received,
    /// Ack sent, executing and streaming data
    Acked,
    /// Final sent
    Committed,
    /// Error sent
    Failed,
    /// Nack sent
    Denied,
}

impl ServerState {
    /// Name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Acked => "acked",
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::Denied => "denied",
        }
    }

    /// Whether the exchange is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed | Self::Denied)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Ack and execute
    Grant,
    /// Nack with a reason
    Deny(String),
}

/// Outcome of executing an operation: final payload or error message
pub type Execution = std::result::Result<Vec<Element>, String>;

/// Pluggable authorization and execution of inbound operations.
pub trait OperationHandler: Send {
    /// Decide whether `requester` may run `op`
    fn authorize(&mut self, op: &Op, requester: &str) -> Decision {
        let _ = (op, requester);
        Decision::Grant
    }

    /// Run `op`, streaming intermediate results through `responder`.
    ///
    /// `Ok` children become the `final` payload, `Err` becomes the `error`
    /// text.
    fn execute(&mut self, op: &Op, requester: &str, responder: &mut Responder<'_>) -> Execution;
}

/// One inbound request being served.
#[derive(Debug, Clone)]
pub struct Server {
    state: ServerState,
    op: Op,
    requester: String,
    token: String,
    data_sent: usize,
}

impl Server {
    /// Serve `op` for `requester`. The op must carry a token.
    pub fn new(op: Op, requester: impl Into<String>) -> Result<Self> {
        let token = op
            .token()
            .ok_or_else(|| VertebraError::InvalidStanza("operation without token".to_string()))?
            .to_string();
        Ok(Self {
            state: ServerState::Received,
            op,
            requester: requester.into(),
            token,
            data_sent: 0,
        })
    }

    /// Build from an inbound operation stanza
    pub fn from_iq(iq: &Iq) -> Result<Self> {
        let body = iq
            .body()
            .ok_or_else(|| VertebraError::InvalidStanza("operation iq without body".to_string()))?;
        let requester = iq
            .from
            .as_deref()
            .ok_or_else(|| VertebraError::InvalidStanza("operation iq without sender".to_string()))?;
        Self::new(Op::from_element(body)?, requester)
    }

    /// Current state
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Correlation token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Requesting agent
    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// The requested operation
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Number of data stanzas sent
    pub fn data_sent(&self) -> usize {
        self.data_sent
    }

    /// Authorize and execute, emitting ack/nack, data and the terminal
    /// stanza. Runs only once; later calls return the current state.
    pub fn run(&mut self, agent: &mut dyn Agent, handler: &mut dyn OperationHandler) -> ServerState {
        if self.state != ServerState::Received {
            tracing::warn!(token = %self.token, state = %self.state, "server already ran");
            return self.state;
        }

        if let Decision::Deny(reason) = handler.authorize(&self.op, &self.requester) {
            tracing::info!(
                token = %self.token,
                requester = %self.requester,
                op_type = %self.op.op_type(),
                %reason,
                "operation denied"
            );
            self.emit(agent, elements::nack(&self.token).with_text(reason));
            self.state = ServerState::Denied;
            return self.state;
        }

        self.emit(agent, elements::ack(&self.token));
        self.state = ServerState::Acked;

        let op = self.op.clone();
        let requester = self.requester.clone();
        let outcome = {
            let mut responder = Responder {
                server: self,
                agent: &mut *agent,
            };
            handler.execute(&op, &requester, &mut responder)
        };

        match outcome {
            Ok(children) => self.finish(agent, children),
            Err(message) => self.fail(agent, &message),
        };
        self.state
    }

    /// Stream one data stanza. Only valid between ack and the terminal stanza.
    pub fn data(&mut self, agent: &mut dyn Agent, children: Vec<Element>) -> bool {
        if !self.guard("data") {
            return false;
        }
        let mut body = elements::data(&self.token);
        body.children = children;
        self.emit(agent, body);
        self.data_sent += 1;
        true
    }

    /// Send `final` and terminate
    pub fn finish(&mut self, agent: &mut dyn Agent, children: Vec<Element>) -> bool {
        if !self.guard("final") {
            return false;
        }
        let mut body = elements::final_(&self.token);
        body.children = children;
        self.emit(agent, body);
        self.state = ServerState::Committed;
        tracing::info!(token = %self.token, requester = %self.requester, data = self.data_sent, "operation committed");
        true
    }

    /// Send `error` and terminate
    pub fn fail(&mut self, agent: &mut dyn Agent, message: &str) -> bool {
        if !self.guard("error") {
            return false;
        }
        self.emit(agent, elements::error(&self.token).with_text(message));
        self.state = ServerState::Failed;
        tracing::info!(token = %self.token, requester = %self.requester, %message, "operation failed");
        true
    }

    fn guard(&self, what: &str) -> bool {
        if self.state == ServerState::Acked {
            return true;
        }
        tracing::warn!(token = %self.token, state = %self.state, stanza = what, "send refused");
        false
    }

    fn emit(&self, agent: &mut dyn Agent, body: Element) {
        let iq = Iq::set(self.requester.as_str(), agent.jid()).with_body(body);
        agent.send_stanza(iq);
    }
}

/// Handle given to [`OperationHandler::execute`] for streaming data.
pub struct Responder<'a> {
    server: &'a mut Server,
    agent: &'a mut dyn Agent,
}

impl Responder<'_> {
    /// Send one data stanza carrying `children`
    pub fn data(&mut self, children: Vec<Element>) -> bool {
        self.server.data(&mut *self.agent, children)
    }

    /// Send one data stanza carrying a single named value
    pub fn value(&mut self, name: &str, value: &str) -> bool {
        self.data(vec![elements::res(value, Some(name))])
    }

    /// Correlation token of the exchange
    pub fn token(&self) -> &str {
        self.server.token()
    }
}
