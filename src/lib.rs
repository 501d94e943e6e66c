//! # Vertebra - Token-Correlated Operations Between Agents
//!
//! Protocol core for agents on an XMPP-style message bus. Individual stanzas
//! are best-effort and unordered; this crate layers request/response
//! operations on top of them.
//!
//! ## Features
//!
//! - **Token correlation**: every stanza of an exchange carries the token
//!   stamped on the original operation
//! - **Per-destination serialization**: at most one request awaits a
//!   destination's ack at a time
//! - **Resumable work queue**: requests wait in a FIFO synapse queue until
//!   the connection is up and the destination is free
//! - **Pluggable serving**: inbound operations are authorized and executed by
//!   an [`OperationHandler`], usually a [`Router`]
//! - **Actor runtime**: a tokio task per agent, driven by commands
//!
//! ## Protocol Overview
//!
//! ```text
//! Client agent                          Server agent
//!    |                                      |
//!    |==== op(type, token, args) ==========>|
//!    |<=== ack | nack ======================|
//!    |<=== data (0..n) =====================|
//!    |<=== final | error ==================|
//! ```
//!
//! Each `=>` is an `iq type="set"` answered by an `iq type="result"` that
//! copies its id and body.
//!
//! ### Client States
//!
//! ```text
//!           attempt             ack              final
//!   [new] ──────────> [ready] ──────> [consume] ──────> [commit]
//!                        │               │  └─data─┘
//!                        │ nack          │ error
//!                        v               v
//!                   [authfail]        [error]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vertebra::{Config, LoopbackConnection, Node, Op, Router};
//! use vertebra::stanza::elements;
//!
//! let router = Router::new().route("/gem", |_op, _from, out| {
//!     out.value("name", "rake");
//!     Ok(vec![elements::res("1", Some("count"))])
//! });
//! let mut node = Node::new(&Config::default(), LoopbackConnection::open(), router);
//!
//! let token = node.request(Op::new("/gem/list")?, "host@cluster");
//! for iq in node.core_mut().connection_mut().drain() {
//!     bus.send(iq);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`resource`]: Hierarchical resource identifiers
//! - [`op`]: Operations and their arguments
//! - [`stanza`]: Envelopes and protocol elements
//! - [`synapse`]: Deferred work queue
//! - [`protocol`]: Client and server state machines, routing
//! - [`agent`]: Hosting agent, registries and tokio runtime
//! - [`config`]: Configuration management
//! - [`logging`]: Tracing subscriber setup
//! - [`error`]: Error types and result aliases

pub mod agent;
pub mod config;
pub mod error;
pub mod logging;
pub mod op;
pub mod protocol;
pub mod resource;
pub mod stanza;
pub mod synapse;

// Re-exports for convenience
pub use agent::{Agent, AgentCore, Connection, Inbound, LoopbackConnection, Node};
pub use config::Config;
pub use error::{Result, VertebraError};
pub use op::{ArgValue, Op};
pub use protocol::{
    Client, ClientState, Decision, Execution, OperationHandler, Responder, Router, Server,
    ServerState,
};
pub use resource::Resource;
pub use stanza::{Element, Iq, IqType, StanzaKind};
pub use synapse::{Attempt, DrainMode, Synapse, SynapseQueue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
