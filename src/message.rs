//! Message envelope handed to transports, and the record of a delivered one.
//!
//! Phone numbers are carried verbatim. No syntax validation happens here;
//! callers supply carrier-formatted numbers and pre-rendered text.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

/// An ordered list of recipient addresses.
///
/// Converts from a single address (normalised to a one-element list) or from
/// any list of addresses. Order is preserved and duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipients(Vec<String>);

impl Recipients {
    /// Consume into the underlying list.
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Borrow the addresses.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for Recipients {
    fn from(value: &str) -> Self {
        Self(vec![value.to_owned()])
    }
}

impl From<String> for Recipients {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<&String> for Recipients {
    fn from(value: &String) -> Self {
        Self(vec![value.clone()])
    }
}

impl From<Vec<String>> for Recipients {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(value: Vec<&str>) -> Self {
        Self(value.into_iter().map(str::to_owned).collect())
    }
}

impl From<&[&str]> for Recipients {
    fn from(value: &[&str]) -> Self {
        Self(value.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl From<&[String]> for Recipients {
    fn from(value: &[String]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for Recipients {
    fn from(value: [&str; N]) -> Self {
        Self(value.iter().map(|s| (*s).to_owned()).collect())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A text message: sender, recipients, body.
///
/// An empty `from` means "use the messenger or transport default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    from: String,
    to: Vec<String>,
    content: String,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address.
    pub fn set_from(&mut self, number: impl Into<String>) -> &mut Self {
        self.from = number.into();
        self
    }

    /// Replace the recipient list.
    pub fn set_to(&mut self, recipients: impl Into<Recipients>) -> &mut Self {
        self.to = recipients.into().into_vec();
        self
    }

    /// Set the text body.
    pub fn set_content(&mut self, content: impl Into<String>) -> &mut Self {
        self.content = content.into();
        self
    }

    /// Sender address (may be empty).
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Recipient addresses in insertion order.
    pub fn to(&self) -> &[String] {
        &self.to
    }

    /// Text body.
    pub fn content(&self) -> &str {
        &self.content
    }
}

const RENDER_DELIMITER: &str = "----- Sms Message -----";

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RENDER_DELIMITER}")?;
        writeln!(f, "From: {}", self.from)?;
        writeln!(f, "To: [ {} ]", self.to.join(", "))?;
        writeln!(f, "Content: {}", self.content)?;
        writeln!(f, "{RENDER_DELIMITER}")
    }
}

// ---------------------------------------------------------------------------
// SentMessage
// ---------------------------------------------------------------------------

/// Record of a message a transport accepted for delivery.
///
/// Only transports construct these, and only on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    message: Message,
}

impl SentMessage {
    /// Wrap a delivered message.
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    /// The message that was transmitted.
    pub fn original_message(&self) -> &Message {
        &self.message
    }

    /// Take back ownership of the transmitted message.
    pub fn into_message(self) -> Message {
        self.message
    }
}
