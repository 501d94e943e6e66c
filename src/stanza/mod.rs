//! Wire stanzas for the agent API.
//!
//! Stanzas are thin attribute-bag elements: a request travels as an
//! [`Iq`] envelope of type `set` whose single body is one of the agent API
//! elements below, tagged with the exchange's correlation token.
//!
//! | Element         | Attributes        | Sent by | Purpose                         |
//! |-----------------|-------------------|---------|---------------------------------|
//! | `op`            | `type`, `token`   | client  | Operation request                |
//! | `authorization` | `from`, `to`      | client  | Capability assertion inside `op` |
//! | `ack` / `nack`  | `token`           | server  | Accept / refuse the request      |
//! | `data`          | `token`           | server  | One unit of streamed result      |
//! | `final`         | `token`           | server  | Terminal success                 |
//! | `error`         | `token`           | server  | Terminal failure                 |
//! | `res`           | `name`            | either  | Named value, text = value        |
//!
//! Every stanza received as `set` is answered with a `result` envelope that
//! copies the id and body (see [`Iq::reply`]).

mod element;
pub mod elements;
mod iq;

pub use element::Element;
pub use elements::StanzaKind;
pub use iq::{Iq, IqType};

/// Namespace of every agent API element
pub const AGENT_API_NS: &str = "http://xmlschema.engineyard.com/agent/api";
