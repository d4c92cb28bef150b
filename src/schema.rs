//! Request conformance check against an XSD schema, backed by libxml2.
//!
//! Validation never stops at the first problem: every error libxml2 reports
//! is collected and returned together in one `ValidationError`.

use std::path::{Path, PathBuf};
use std::sync::Once;

use libxml::error::StructuredError;
use libxml::parser::{Parser, ParserOptions};
use libxml::schemas::{SchemaParserContext, SchemaValidationContext};

use crate::errors::ExchangeError;

/// A compiled schema.
///
/// libxml2 contexts are bound to the thread that made them, so a validator is
/// built and used inside one blocking task (see [`validate_with_file`]).
pub struct SchemaValidator {
    context: SchemaValidationContext,
}

/// libxml2 global state must be initialised once before threads share it.
fn init_libxml() {
    static INIT: Once = Once::new();
    INIT.call_once(|| unsafe { libxml::bindings::xmlInitParser() });
}

fn unavailable(msg: impl Into<String>) -> ExchangeError {
    ExchangeError::SchemaUnavailable(msg.into())
}

fn describe(error: &StructuredError) -> String {
    let message = error
        .message
        .as_deref()
        .map(str::trim)
        .unwrap_or("unspecified schema error");
    match error.line {
        Some(line) if line > 0 => format!("line {}: {}", line, message),
        _ => message.to_string(),
    }
}

fn describe_all(errors: &[StructuredError]) -> Vec<String> {
    errors.iter().map(describe).collect()
}

impl SchemaValidator {
    /// Reads and compiles a schema file.
    ///
    /// A missing file or an unparsable schema is `SchemaUnavailable`.
    pub fn load(path: &Path) -> Result<Self, ExchangeError> {
        if !path.is_file() {
            return Err(unavailable(format!("{} does not exist", path.display())));
        }
        let location = path
            .to_str()
            .ok_or_else(|| unavailable(format!("{} is not a UTF-8 path", path.display())))?;

        init_libxml();
        let mut parser = SchemaParserContext::from_file(location);
        Self::compile(&mut parser).map_err(|e| match e {
            ExchangeError::SchemaUnavailable(msg) => {
                unavailable(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Compiles a schema from its text.
    pub fn from_markup(src: &str) -> Result<Self, ExchangeError> {
        init_libxml();
        let mut parser = SchemaParserContext::from_buffer(src);
        Self::compile(&mut parser)
    }

    fn compile(parser: &mut SchemaParserContext) -> Result<Self, ExchangeError> {
        SchemaValidationContext::from_parser(parser)
            .map(|context| SchemaValidator { context })
            .map_err(|errors| {
                let messages = describe_all(&errors);
                if messages.is_empty() {
                    unavailable("schema could not be compiled")
                } else {
                    unavailable(messages.join("; "))
                }
            })
    }

    /// Validates a wire document.
    ///
    /// The document's own encoding declaration is honoured. Every violation
    /// becomes one message in the returned `ValidationError`.
    pub fn validate(&mut self, document: &[u8]) -> Result<(), ExchangeError> {
        let options = ParserOptions {
            recover: false,
            ..Default::default()
        };
        let parsed = Parser::default()
            .parse_string_with_options(document, options)
            .map_err(|e| ExchangeError::ValidationError {
                messages: vec![format!("document is not well-formed: {:?}", e)],
            })?;

        self.context.validate_document(&parsed).map_err(|errors| {
            let mut messages = describe_all(&errors);
            if messages.is_empty() {
                messages.push("document does not conform to the schema".to_string());
            }
            ExchangeError::ValidationError { messages }
        })
    }
}

/// Loads the schema at `path` and validates `document` against it on the
/// blocking pool.
///
/// The schema is read on every call, so a replaced file takes effect on the
/// next exchange.
pub async fn validate_with_file(path: PathBuf, document: Vec<u8>) -> Result<(), ExchangeError> {
    tokio::task::spawn_blocking(move || SchemaValidator::load(&path)?.validate(&document))
        .await
        .map_err(|e| unavailable(format!("schema check did not complete: {}", e)))?
}
