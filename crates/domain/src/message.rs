use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of a one-shot message exchange, mirroring the iq kinds it rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Get = 1,
    Set = 2,
}

impl RequestType {
    /// Wire form used as the iq `type` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Get => "get",
            RequestType::Set => "set",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "get" => Some(RequestType::Get),
            "set" => Some(RequestType::Set),
            _ => None,
        }
    }
}

impl TryFrom<u32> for RequestType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(RequestType::Get),
            2 => Ok(RequestType::Set),
            other => Err(Error::Validation(format!(
                "invalid request type value: {other}"
            ))),
        }
    }
}

/// Typed error classes carried on failed exchanges, matching the XMPP
/// stanza-error `type` attribute one for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Cancel = 1,
    Continue = 2,
    Modify = 3,
    Auth = 4,
    Wait = 5,
}

impl ErrorType {
    /// Wire nick used as the `error` element's `type` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Cancel => "cancel",
            ErrorType::Continue => "continue",
            ErrorType::Modify => "modify",
            ErrorType::Auth => "auth",
            ErrorType::Wait => "wait",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "cancel" => Some(ErrorType::Cancel),
            "continue" => Some(ErrorType::Continue),
            "modify" => Some(ErrorType::Modify),
            "auth" => Some(ErrorType::Auth),
            "wait" => Some(ErrorType::Wait),
            _ => None,
        }
    }
}

impl TryFrom<u32> for ErrorType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(ErrorType::Cancel),
            2 => Ok(ErrorType::Continue),
            3 => Ok(ErrorType::Modify),
            4 => Ok(ErrorType::Auth),
            5 => Ok(ErrorType::Wait),
            other => Err(Error::Validation(format!(
                "invalid error type value: {other}"
            ))),
        }
    }
}

/// The typed tuple a failed exchange terminates with.
///
/// `stanza_condition` is the defined XMPP condition element name
/// (`conflict`, `service-unavailable`, …); `ytstenut_condition` is the
/// free-form application condition qualified by the message namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageError {
    pub error_type: ErrorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stanza_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ytstenut_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MessageError {
    pub fn new(error_type: ErrorType) -> Self {
        Self {
            error_type,
            stanza_condition: None,
            ytstenut_condition: None,
            text: None,
        }
    }

    pub fn with_stanza_condition(mut self, name: impl Into<String>) -> Self {
        self.stanza_condition = Some(name.into());
        self
    }

    pub fn with_ytstenut_condition(mut self, name: impl Into<String>) -> Self {
        self.ytstenut_condition = Some(name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error_type.as_str())?;
        if let Some(c) = &self.stanza_condition {
            write!(f, " {c}")?;
        }
        if let Some(c) = &self.ytstenut_condition {
            write!(f, " {c}")?;
        }
        if let Some(t) = &self.text {
            write!(f, ": {t}")?;
        }
        Ok(())
    }
}
