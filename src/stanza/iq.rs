//! IQ request/response envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::element::Element;
use super::elements;
use crate::error::{Result, VertebraError};

/// IQ envelope type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IqType {
    /// Query
    Get,
    /// Request or notification
    Set,
    /// Positive reply
    Result,
    /// Transport-level failure reply
    Error,
}

impl IqType {
    /// Attribute value on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
            Self::Error => "error",
        }
    }

    /// Parse an attribute value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "get" => Some(Self::Get),
            "set" => Some(Self::Set),
            "result" => Some(Self::Result),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A transport envelope carrying at most one body element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iq {
    /// Correlation id, copied into replies
    pub id: String,
    /// Envelope type
    #[serde(rename = "type")]
    pub kind: IqType,
    /// Sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// `xml:lang`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Body element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Element>,
}

impl Iq {
    /// Create an envelope with a fresh id
    pub fn new(kind: IqType, to: impl Into<String>) -> Self {
        Self {
            id: next_id(),
            kind,
            from: None,
            to: Some(to.into()),
            lang: None,
            body: None,
        }
    }

    /// Create a `set` envelope from `from` to `to`
    pub fn set(to: impl Into<String>, from: impl Into<String>) -> Self {
        Self::new(IqType::Set, to).with_from(from)
    }

    /// Set the sender
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the correlation id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set `xml:lang`
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Attach the body element
    pub fn with_body(mut self, body: Element) -> Self {
        self.body = Some(body);
        self
    }

    /// Body element, if any
    pub fn body(&self) -> Option<&Element> {
        self.body.as_ref()
    }

    /// Token attribute of the body element
    pub fn token(&self) -> Option<&str> {
        self.body().and_then(elements::token)
    }

    /// Build the `result` reply: same id and lang, sender and recipient
    /// swapped, body copied unmodified.
    pub fn reply(&self) -> Iq {
        Iq {
            id: self.id.clone(),
            kind: IqType::Result,
            from: self.to.clone(),
            to: self.from.clone(),
            lang: self.lang.clone(),
            body: self.body.clone(),
        }
    }

    /// Build the `error` reply bouncing this stanza back to its sender
    pub fn error_reply(&self) -> Iq {
        Iq {
            kind: IqType::Error,
            ..self.reply()
        }
    }

    /// Render as an `iq` element
    pub fn to_element(&self) -> Element {
        let mut el = Element::new("iq")
            .attr("id", self.id.as_str())
            .attr("type", self.kind.as_str())
            .attr_opt("from", self.from.as_deref())
            .attr_opt("to", self.to.as_deref())
            .attr_opt("xml:lang", self.lang.as_deref());
        if let Some(body) = &self.body {
            el.children.push(body.clone());
        }
        el
    }

    /// Decode an `iq` element
    pub fn from_element(element: &Element) -> Result<Self> {
        if element.name != "iq" {
            return Err(VertebraError::InvalidStanza(format!(
                "expected iq, got {}",
                element.name
            )));
        }
        let kind = element
            .get_attr("type")
            .and_then(IqType::parse)
            .ok_or_else(|| VertebraError::InvalidStanza("iq missing valid type".to_string()))?;
        let id = element
            .get_attr("id")
            .ok_or_else(|| VertebraError::InvalidStanza("iq missing id".to_string()))?;
        if element.children.len() > 1 {
            return Err(VertebraError::InvalidStanza(
                "iq carries more than one body element".to_string(),
            ));
        }

        Ok(Self {
            id: id.to_string(),
            kind,
            from: element.get_attr("from").map(String::from),
            to: element.get_attr("to").map(String::from),
            lang: element.get_attr("xml:lang").map(String::from),
            body: element.children.first().cloned(),
        })
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Iq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_element())
    }
}

fn next_id() -> String {
    format!("vtb-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stanza::elements::ack;

    #[test]
    fn test_set_envelope() {
        let iq = Iq::set("to@host", "from@host");
        assert_eq!(iq.kind, IqType::Set);
        assert_eq!(iq.to.as_deref(), Some("to@host"));
        assert_eq!(iq.from.as_deref(), Some("from@host"));
        assert!(iq.id.starts_with("vtb-"));
    }

    #[test]
    fn test_reply_mirrors_envelope() {
        let iq = Iq::set("agent@example.com", "test@example.com")
            .with_id("42")
            .with_lang("en")
            .with_body(ack("tok"));
        let reply = iq.reply();

        assert_eq!(reply.id, "42");
        assert_eq!(reply.kind, IqType::Result);
        assert_eq!(reply.to.as_deref(), Some("test@example.com"));
        assert_eq!(reply.from.as_deref(), Some("agent@example.com"));
        assert_eq!(reply.lang.as_deref(), Some("en"));
        assert_eq!(reply.body, iq.body);
    }

    #[test]
    fn test_error_reply_bounces_body() {
        let iq = Iq::set("agent@example.com", "test@example.com")
            .with_id("42")
            .with_body(ack("tok"));
        let bounce = iq.error_reply();

        assert_eq!(bounce.kind, IqType::Error);
        assert_eq!(bounce.id, "42");
        assert_eq!(bounce.to.as_deref(), Some("test@example.com"));
        assert_eq!(bounce.token(), Some("tok"));
    }

    #[test]
    fn test_element_roundtrip() {
        let iq = Iq::set("b@host", "a@host").with_id("7").with_body(ack("t"));
        let parsed = Iq::from_element(&iq.to_element()).unwrap();
        assert_eq!(parsed, iq);
        assert_eq!(parsed.token(), Some("t"));
    }

    #[test]
    fn test_from_element_rejects_bad_envelopes() {
        assert!(Iq::from_element(&Element::new("message")).is_err());
        assert!(Iq::from_element(&Element::new("iq").attr("id", "1")).is_err());
        let two = Element::new("iq")
            .attr("id", "1")
            .attr("type", "set")
            .child(ack("a"))
            .child(ack("b"));
        assert!(Iq::from_element(&two).is_err());
    }

    #[test]
    fn test_display_renders_xml() {
        let iq = Iq::set("b@host", "a@host").with_id("1");
        assert_eq!(
            iq.to_string(),
            r#"<iq from="a@host" id="1" to="b@host" type="set"/>"#
        );
    }
}
