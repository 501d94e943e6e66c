//! Operation descriptors.
//!
//! An [`Op`] names an operation type and carries its arguments. Arguments
//! are either [`Resource`]s (path-like, positional) or scalars (named,
//! stored exactly as given).
//!
//! ```rust,ignore
//! use vertebra::{Op, Resource};
//!
//! // Type only
//! let op = Op::new("/gem/list")?;
//!
//! // Positional path arguments, keyed by their own path
//! let op = Op::with_positional("/gem/install", ["/cluster/rg"])?;
//!
//! // Positional plus named arguments
//! let op = Op::with_args("/files/copy", ["/node/a"], [("from", "/george"), ("to", "/hat")])?;
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VertebraError};
use crate::resource::Resource;
use crate::stanza::{elements, Element, Iq, StanzaKind, AGENT_API_NS};

/// Element name for a resource-valued argument
const RESOURCE_ARG: &str = "res";
/// Element name for a scalar argument
const SCALAR_ARG: &str = "string";

/// An argument value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgValue {
    /// Path-like value
    Resource(Resource),
    /// Opaque scalar, kept as passed
    Scalar(String),
}

impl ArgValue {
    /// Resource value, if this is one
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(res) => Some(res),
            Self::Scalar(_) => None,
        }
    }

    /// The value's string form
    pub fn as_str(&self) -> &str {
        match self {
            Self::Resource(res) => res.as_str(),
            Self::Scalar(s) => s,
        }
    }

    fn to_element(&self, name: &str) -> Element {
        let tag = match self {
            Self::Resource(_) => RESOURCE_ARG,
            Self::Scalar(_) => SCALAR_ARG,
        };
        Element::with_ns(tag, AGENT_API_NS)
            .attr("name", name)
            .with_text(self.as_str())
    }
}

impl From<Resource> for ArgValue {
    fn from(res: Resource) -> Self {
        Self::Resource(res)
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

/// One operation invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    op_type: Resource,
    args: IndexMap<String, ArgValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl Op {
    /// Operation with no arguments
    pub fn new(op_type: impl Into<Resource>) -> Result<Self> {
        let op_type = op_type.into();
        if op_type.is_empty() {
            return Err(VertebraError::EmptyOperationType);
        }
        Ok(Self {
            op_type,
            args: IndexMap::new(),
            token: None,
        })
    }

    /// Operation with positional path arguments, each keyed by its own path
    pub fn with_positional<I, R>(op_type: impl Into<Resource>, positional: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<Resource>,
    {
        let mut op = Self::new(op_type)?;
        for res in positional {
            let res = res.into();
            op.args.insert(res.to_string(), ArgValue::Resource(res));
        }
        Ok(op)
    }

    /// Operation with positional path arguments followed by named arguments.
    ///
    /// Named values are not coerced: strings stay scalars.
    pub fn with_args<I, R, N, K, V>(
        op_type: impl Into<Resource>,
        positional: I,
        named: N,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<Resource>,
        N: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ArgValue>,
    {
        let mut op = Self::with_positional(op_type, positional)?;
        for (key, value) in named {
            op.args.insert(key.into(), value.into());
        }
        Ok(op)
    }

    /// Start a builder
    pub fn builder(op_type: impl Into<Resource>) -> OpBuilder {
        OpBuilder {
            op_type: op_type.into(),
            args: IndexMap::new(),
        }
    }

    /// Operation type
    pub fn op_type(&self) -> &Resource {
        &self.op_type
    }

    /// Arguments in insertion order
    pub fn args(&self) -> &IndexMap<String, ArgValue> {
        &self.args
    }

    /// Look up an argument
    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }

    /// Correlation token, once stamped
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Stamp the correlation token, replacing any earlier one
    pub(crate) fn stamp_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    /// Body element: `op[type, token]` with the authorization assertion
    /// and one child per argument.
    pub fn to_element(&self, to: &str, from: &str) -> Element {
        let mut el = elements::operation(&self.op_type, self.token().unwrap_or(""));
        el.children.push(elements::authorization(Some(from), Some(to)));
        el.children.extend(self.args.iter().map(|(name, value)| value.to_element(name)));
        el
    }

    /// Request stanza for `to`, sent by `from`
    pub fn to_iq(&self, to: &str, from: &str) -> Iq {
        Iq::set(to, from).with_body(self.to_element(to, from))
    }

    /// Decode an `op` body element
    pub fn from_element(element: &Element) -> Result<Self> {
        if StanzaKind::from_element(element) != Some(StanzaKind::Operation) {
            return Err(VertebraError::InvalidStanza(format!(
                "expected op, got {}",
                element.name
            )));
        }
        let op_type = element
            .get_attr("type")
            .ok_or_else(|| VertebraError::InvalidStanza("op missing type".to_string()))?;
        let mut op = Self::new(op_type)?;
        if let Some(token) = elements::token(element).filter(|t| !t.is_empty()) {
            op.stamp_token(token);
        }

        for child in &element.children {
            let value = match child.name.as_str() {
                RESOURCE_ARG => ArgValue::Resource(Resource::new(child.text())),
                SCALAR_ARG => ArgValue::Scalar(child.text().to_string()),
                _ => continue,
            };
            let name = child
                .get_attr("name")
                .map_or_else(|| value.as_str().to_string(), String::from);
            op.args.insert(name, value);
        }
        Ok(op)
    }
}

/// Incremental [`Op`] construction
#[derive(Debug, Clone)]
pub struct OpBuilder {
    op_type: Resource,
    args: IndexMap<String, ArgValue>,
}

impl OpBuilder {
    /// Add a positional path argument
    pub fn resource(mut self, res: impl Into<Resource>) -> Self {
        let res = res.into();
        self.args.insert(res.to_string(), ArgValue::Resource(res));
        self
    }

    /// Add a named argument
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Finish, rejecting an empty operation type
    pub fn build(self) -> Result<Op> {
        let mut op = Op::new(self.op_type)?;
        op.args = self.args;
        Ok(op)
    }
}
