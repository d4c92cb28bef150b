use crate::codes::InvalidCode;
use crate::models::ResponseEnvelope;
use crate::signing::VerifyOutcome;
use std::fmt;

/// Kind of network-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    /// The gateway did not answer within the deadline.
    Timeout,
    /// TCP connect or TLS handshake failed.
    Connect,
    /// Any other I/O or protocol failure while sending or reading the body.
    Other,
}

impl fmt::Display for TransportFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailureKind::Timeout => f.write_str("timeout"),
            TransportFailureKind::Connect => f.write_str("connect"),
            TransportFailureKind::Other => f.write_str("io"),
        }
    }
}

/// A reply whose payload could be extracted but whose signature did not check out.
///
/// Carried by [`ExchangeError::InvalidCertificate`] so the caller can still
/// inspect whatever diagnostic text the gateway sent back.
#[derive(Debug, Clone)]
pub struct UnverifiedReply {
    /// How the signature check ended (never `Verified`).
    pub outcome: VerifyOutcome,
    /// Raw payload bytes taken out of the envelope.
    pub payload: Vec<u8>,
    /// Payload decoded to text, when its charset could be honored.
    pub text: Option<String>,
    /// Decoded response, when the payload was a well-formed reply document.
    pub response: Option<ResponseEnvelope>,
}

/// Errors produced by one exchange with the bureau gateway.
///
/// Every stage fails fast: the first error aborts the remaining pipeline.
#[derive(Debug)]
pub enum ExchangeError {
    /// The document could not be serialized or the reply is not well-formed markup.
    MalformedDocument(String),
    /// A text value is outside its closed enumeration.
    InvalidEnumeration(InvalidCode),
    /// A character has no representation in the wire codepage.
    UnsupportedCharacter {
        character: char,
        /// Character (not byte) offset of the first offending character.
        position: usize,
        charset: &'static str,
    },
    /// The reply declares an encoding label nobody knows.
    UnknownCharset(String),
    /// The configured schema file is missing or could not be parsed.
    SchemaUnavailable(String),
    /// The request does not conform to the schema; every violation is listed.
    ValidationError { messages: Vec<String> },
    /// The signed envelope framing is broken.
    MalformedEnvelope(String),
    /// Key material could not be loaded.
    InvalidKey(String),
    /// Network-level failure (timeout, refused connection, TLS).
    TransportFailure {
        kind: TransportFailureKind,
        message: String,
    },
    /// The gateway answered with a non-success HTTP status.
    RequestRejected { status: u16, body: String },
    /// The reply signature failed verification or is missing.
    InvalidCertificate(Box<UnverifiedReply>),
}

impl ExchangeError {
    /// Whether a caller-side retry policy may reasonably resend.
    ///
    /// The pipeline never retries by itself: a resend is a new submission.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(
            self,
            ExchangeError::TransportFailure {
                kind: TransportFailureKind::Timeout | TransportFailureKind::Connect,
                ..
            }
        )
    }

    pub(crate) fn timeout(message: impl Into<String>) -> Self {
        ExchangeError::TransportFailure {
            kind: TransportFailureKind::Timeout,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::MalformedDocument(msg) => write!(f, "Malformed document: {}", msg),
            ExchangeError::InvalidEnumeration(code) => write!(f, "Invalid enumeration: {}", code),
            ExchangeError::UnsupportedCharacter {
                character,
                position,
                charset,
            } => write!(
                f,
                "Unsupported character {:?} (U+{:04X}) at position {} for {}",
                character, *character as u32, position, charset
            ),
            ExchangeError::UnknownCharset(label) => write!(f, "Unknown charset: {}", label),
            ExchangeError::SchemaUnavailable(msg) => write!(f, "Schema unavailable: {}", msg),
            ExchangeError::ValidationError { messages } => {
                write!(f, "Schema validation failed ({} errors)", messages.len())?;
                for message in messages {
                    write!(f, "\n  {}", message)?;
                }
                Ok(())
            }
            ExchangeError::MalformedEnvelope(msg) => write!(f, "Malformed envelope: {}", msg),
            ExchangeError::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
            ExchangeError::TransportFailure { kind, message } => {
                write!(f, "Transport failure ({}): {}", kind, message)
            }
            ExchangeError::RequestRejected { status, body } => {
                write!(f, "Invalid request: gateway returned {}", status)?;
                if !body.is_empty() {
                    write!(f, ": {}", body)?;
                }
                Ok(())
            }
            ExchangeError::InvalidCertificate(reply) => {
                write!(f, "Invalid certificate: reply is {}", reply.outcome)
            }
        }
    }
}

impl std::error::Error for ExchangeError {}

impl From<InvalidCode> for ExchangeError {
    fn from(err: InvalidCode) -> Self {
        ExchangeError::InvalidEnumeration(err)
    }
}

impl From<quick_xml::Error> for ExchangeError {
    fn from(err: quick_xml::Error) -> Self {
        ExchangeError::MalformedDocument(err.to_string())
    }
}

impl From<reqwest::Error> for ExchangeError {
    /// Classifies a `reqwest::Error` into a transport failure kind.
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportFailureKind::Timeout
        } else if err.is_connect() {
            TransportFailureKind::Connect
        } else {
            TransportFailureKind::Other
        };
        ExchangeError::TransportFailure {
            kind,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_message() {
        let err = ExchangeError::ValidationError {
            messages: vec!["first".to_string(), "second".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("2 errors"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }

    #[test]
    fn test_unsupported_character_display() {
        let err = ExchangeError::UnsupportedCharacter {
            character: '漢',
            position: 3,
            charset: "windows-1251",
        };
        assert!(err.to_string().contains("U+6F22"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ExchangeError::timeout("slow").is_retryable_by_caller());
        assert!(!ExchangeError::RequestRejected {
            status: 500,
            body: String::new()
        }
        .is_retryable_by_caller());
        assert!(!ExchangeError::MalformedDocument("x".into()).is_retryable_by_caller());
    }
}
