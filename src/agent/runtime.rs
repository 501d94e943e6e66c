//! Tokio runtime for a [`Node`].
//!
//! One task owns the node and applies [`Command`]s strictly in arrival
//! order, so the protocol never sees concurrent mutation. Outbound stanzas
//! leave through a [`ChannelConnection`]; requests that finish are published
//! on a separate channel.
//!
//! ```rust,ignore
//! let mut agent = runtime::spawn(&config, Router::new().route("/gem", list_gems));
//! agent.handle.set_connection(true)?;
//! let token = agent.handle.request(Op::new("/gem/list")?, "node@cluster").await?;
//! while let Some(iq) = agent.outbound.recv().await {
//!     bus.send(iq).await?;
//! }
//! ```

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use super::{Connection, Node};
use crate::config::Config;
use crate::error::Result;
use crate::op::Op;
use crate::protocol::{Client, OperationHandler};
use crate::stanza::Iq;

/// Message to the agent task
#[derive(Debug)]
pub enum Command {
    /// Inbound stanza from the bus
    Deliver(Iq),
    /// Issue an operation; the token is sent back on `reply`
    Request {
        /// Operation to issue
        op: Op,
        /// Destination
        to: String,
        /// Receives the correlation token
        reply: oneshot::Sender<String>,
    },
    /// Connection went up (`true`) or down
    Connection(bool),
    /// Attempt queued requests
    Fire,
    /// Stop the task
    Shutdown,
}

/// Connection that forwards stanzas to a channel.
#[derive(Debug)]
pub struct ChannelConnection {
    open: bool,
    outbound: mpsc::UnboundedSender<Iq>,
}

impl ChannelConnection {
    /// Create a closed connection feeding `outbound`
    pub fn new(outbound: mpsc::UnboundedSender<Iq>) -> Self {
        Self {
            open: false,
            outbound,
        }
    }

    /// Set the connection state
    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }
}

impl Connection for ChannelConnection {
    fn is_open_and_authenticated(&self) -> bool {
        self.open && !self.outbound.is_closed()
    }

    fn send(&mut self, iq: Iq) {
        if self.outbound.send(iq).is_err() {
            tracing::warn!("outbound channel closed, stanza dropped");
        }
    }
}

/// Cloneable handle to a running agent
#[derive(Debug, Clone)]
pub struct AgentHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl AgentHandle {
    /// Issue `op` to `to`; resolves to the correlation token
    pub async fn request(&self, op: Op, to: impl Into<String>) -> Result<String> {
        let (reply, token) = oneshot::channel();
        self.commands.send(Command::Request {
            op,
            to: to.into(),
            reply,
        })?;
        Ok(token.await?)
    }

    /// Hand an inbound stanza to the agent
    pub fn deliver(&self, iq: Iq) -> Result<()> {
        Ok(self.commands.send(Command::Deliver(iq))?)
    }

    /// Report a connection state change
    pub fn set_connection(&self, open: bool) -> Result<()> {
        Ok(self.commands.send(Command::Connection(open))?)
    }

    /// Attempt queued requests
    pub fn fire(&self) -> Result<()> {
        Ok(self.commands.send(Command::Fire)?)
    }

    /// Stop the agent task
    pub fn shutdown(&self) -> Result<()> {
        Ok(self.commands.send(Command::Shutdown)?)
    }

    /// Whether the agent task has stopped
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}

/// A spawned agent and its channels
#[derive(Debug)]
pub struct RunningAgent {
    /// Command handle
    pub handle: AgentHandle,
    /// Stanzas the agent sends
    pub outbound: mpsc::UnboundedReceiver<Iq>,
    /// Requests that reached a terminal state
    pub finished: mpsc::UnboundedReceiver<Client>,
    /// The agent task
    pub task: JoinHandle<()>,
}

/// Spawn an agent task on the current tokio runtime.
///
/// The connection starts closed; report it with
/// [`AgentHandle::set_connection`].
pub fn spawn(config: &Config, handler: impl OperationHandler + 'static) -> RunningAgent {
    let (outbound_tx, outbound) = mpsc::unbounded_channel();
    let (finished_tx, finished) = mpsc::unbounded_channel();
    let (commands_tx, commands) = mpsc::unbounded_channel();

    let node = Node::new(config, ChannelConnection::new(outbound_tx), handler);
    tracing::info!(jid = %node.jid(), "agent starting");
    let sweep = config
        .client
        .response_timeout()
        .map(|_| config.client.sweep_interval());
    let task = tokio::spawn(run(node, commands, finished_tx, sweep));

    RunningAgent {
        handle: AgentHandle {
            commands: commands_tx,
        },
        outbound,
        finished,
        task,
    }
}

async fn run(
    mut node: Node<ChannelConnection>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    finished: mpsc::UnboundedSender<Client>,
    sweep: Option<Duration>,
) {
    let mut sweeper = sweep.map(|period| {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                if !apply(&mut node, command) {
                    break;
                }
            }
            () = next_sweep(&mut sweeper) => {
                node.expire(Instant::now());
            }
        }

        for client in node.take_finished() {
            if finished.send(client).is_err() {
                tracing::trace!("finished channel closed");
            }
        }
    }

    tracing::info!(jid = %node.jid(), outstanding = node.core().outstanding(), "agent stopped");
}

/// Wait for the next timeout sweep; never resolves without a timeout.
async fn next_sweep(sweeper: &mut Option<Interval>) {
    match sweeper {
        Some(ticker) => {
            ticker.tick().await;
        },
        None => std::future::pending().await,
    }
}

/// Apply one command; false means stop.
fn apply(node: &mut Node<ChannelConnection>, command: Command) -> bool {
    match command {
        Command::Deliver(iq) => {
            if let Err(e) = node.handle_stanza(&iq) {
                tracing::warn!(id = %iq.id, from = ?iq.from, "rejected stanza: {e}");
            }
        },
        Command::Request { op, to, reply } => {
            let token = node.request(op, &to);
            if reply.send(token).is_err() {
                tracing::debug!("requester went away before receiving token");
            }
        },
        Command::Connection(open) => {
            tracing::info!(jid = %node.jid(), open, "connection changed");
            node.core_mut().connection_mut().set_open(open);
            node.connection_changed();
        },
        Command::Fire => {
            node.fire();
        },
        Command::Shutdown => return false,
    }
    true
}
