//! Agent API elements carried inside IQ envelopes.

use serde::{Deserialize, Serialize};

use super::element::Element;
use super::AGENT_API_NS;
use crate::resource::Resource;

/// The kind of an agent API element, keyed by element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StanzaKind {
    /// Operation request (`op`)
    Operation,
    /// Request accepted
    Ack,
    /// Request refused
    Nack,
    /// One unit of streamed result
    Data,
    /// Alias for `data` used by older peers
    Result,
    /// Terminal success
    Final,
    /// Terminal failure
    Error,
}

impl StanzaKind {
    /// Element name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Operation => "op",
            Self::Ack => "ack",
            Self::Nack => "nack",
            Self::Data => "data",
            Self::Result => "result",
            Self::Final => "final",
            Self::Error => "error",
        }
    }

    /// Look up a kind by element name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "op" => Some(Self::Operation),
            "ack" => Some(Self::Ack),
            "nack" => Some(Self::Nack),
            "data" => Some(Self::Data),
            "result" => Some(Self::Result),
            "final" => Some(Self::Final),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Kind of an element, if it is an agent API element
    pub fn from_element(element: &Element) -> Option<Self> {
        Self::from_name(&element.name)
    }

    /// Whether this element ends an exchange
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Nack | Self::Final | Self::Error)
    }
}

impl std::fmt::Display for StanzaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Authorization assertion attached to an operation request
pub fn authorization(from: Option<&str>, to: Option<&str>) -> Element {
    Element::with_ns("authorization", AGENT_API_NS)
        .attr_opt("from", from)
        .attr_opt("to", to)
}

/// Operation request body
pub fn operation(op_type: &Resource, token: &str) -> Element {
    Element::with_ns(StanzaKind::Operation.name(), AGENT_API_NS)
        .attr("type", op_type.as_str())
        .attr("token", token)
}

/// A token-carrying element of the given kind
pub fn token_element(kind: StanzaKind, token: &str) -> Element {
    Element::with_ns(kind.name(), AGENT_API_NS).attr("token", token)
}

/// `ack` element
pub fn ack(token: &str) -> Element {
    token_element(StanzaKind::Ack, token)
}

/// `nack` element
pub fn nack(token: &str) -> Element {
    token_element(StanzaKind::Nack, token)
}

/// `data` element
pub fn data(token: &str) -> Element {
    token_element(StanzaKind::Data, token)
}

/// `final` element
pub fn final_(token: &str) -> Element {
    token_element(StanzaKind::Final, token)
}

/// `error` element
pub fn error(token: &str) -> Element {
    token_element(StanzaKind::Error, token)
}

/// Named result value; the text content is the serialized value
pub fn res(value: &str, name: Option<&str>) -> Element {
    Element::with_ns("res", AGENT_API_NS)
        .attr_opt("name", name)
        .with_text(value)
}

/// Token attribute of an element
pub fn token(element: &Element) -> Option<&str> {
    element.get_attr("token")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_elements_have_api_namespace() {
        let elements = [
            authorization(None, None),
            ack("t"),
            data("t"),
            operation(&Resource::from("/x"), ""),
            res("v", None),
        ];
        for el in elements {
            assert_eq!(el.xmlns.as_deref(), Some(AGENT_API_NS), "{}", el.name);
        }
    }

    #[test]
    fn test_token_element_reads_back() {
        for kind in [
            StanzaKind::Ack,
            StanzaKind::Nack,
            StanzaKind::Data,
            StanzaKind::Final,
            StanzaKind::Error,
        ] {
            let el = token_element(kind, "tok-1");
            assert_eq!(token(&el), Some("tok-1"));
            assert_eq!(StanzaKind::from_element(&el), Some(kind));
        }
    }

    #[test]
    fn test_operation_defaults() {
        let op = operation(&Resource::from("/testop"), "");
        assert_eq!(op.get_attr("type"), Some("/testop"));
        assert_eq!(token(&op), Some(""));
    }

    #[test]
    fn test_res_text_and_name() {
        let el = res("42", Some("answer"));
        assert_eq!(el.text(), "42");
        assert_eq!(el.get_attr("name"), Some("answer"));
        assert_eq!(res("1", None).get_attr("name"), None);
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(StanzaKind::from_name("presence"), None);
        assert!(StanzaKind::Final.is_terminal());
        assert!(!StanzaKind::Data.is_terminal());
    }
}
