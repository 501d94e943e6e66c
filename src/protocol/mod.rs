//! Vertebra operation protocol.
//!
//! Turns independent, best-effort stanzas into token-correlated request
//! exchanges with at most one in-flight request per destination.
//!
//! # Message Flow
//!
//! ```text
//! Client agent                          Server agent
//!    |                                      |
//!    |---- iq set: op(type, token) -------->|  (sent once preconditions hold)
//!    |<--- iq result (mirror) --------------|
//!    |<--- iq set: ack | nack --------------|  authorization hook decides
//!    |---- iq result (mirror) ------------->|
//!    |<--- iq set: data (0..n) -------------|  streamed results
//!    |---- iq result (mirror) ------------->|
//!    |<--- iq set: final | error -----------|  exactly one terminal stanza
//!    |---- iq result (mirror) ------------->|
//! ```
//!
//! # Client State Machine
//!
//! | State      | Inbound             | Next       | Effect                        |
//! |------------|---------------------|------------|-------------------------------|
//! | `new`      | (synapse attempt)   | `ready`    | destination busy, op sent     |
//! | `ready`    | `ack`               | `consume`  | destination released          |
//! | `ready`    | `nack`              | `authfail` | destination released          |
//! | `consume`  | `data` / `result`   | `consume`  | payload buffered              |
//! | `consume`  | `final`             | `commit`   | payload kept as result        |
//! | `consume`  | `error`             | `error`    | payload kept as result        |
//!
//! `commit`, `error` and `authfail` are terminal. Any other pairing is
//! dropped and logged: duplicates and stragglers are expected on a
//! best-effort transport.
//!
//! # Server State Machine
//!
//! ```text
//!   [received] ──grant──> [acked] ──Ok──> [committed]
//!       │                    └────Err──> [failed]
//!       └──deny──> [denied]
//! ```

mod client;
mod router;
mod server;

pub use client::{Client, ClientState};
pub use router::{Action, Router};
pub use server::{Decision, Execution, OperationHandler, Responder, Server, ServerState};
