//! Utility to check an application record against the request schema offline.
//!
//! Serializes the record exactly as an exchange would, without signing or
//! sending it, and lists every schema violation.

use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

use bki_exchange::charset;
use bki_exchange::document;
use bki_exchange::errors::ExchangeError;
use bki_exchange::models::{ApplicationDocument, RequestEnvelope};
use bki_exchange::schema;

/// Main entry point for the request checker.
///
/// Usage: `check_request <application.json> [schema.xsd]`. The schema defaults
/// to `BKI_SCHEMA_PATH`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let application_path = args
        .next()
        .ok_or("usage: check_request <application.json> [schema.xsd]")?;
    let schema_path: PathBuf = args
        .next()
        .or_else(|| env::var("BKI_SCHEMA_PATH").ok())
        .ok_or("no schema given and BKI_SCHEMA_PATH is not set")?
        .into();
    let partner_id = env::var("BKI_PARTNER_ID").unwrap_or_else(|_| "0".to_string());

    let raw = tokio::fs::read_to_string(&application_path).await?;
    let application: ApplicationDocument = serde_json::from_str(&raw)?;
    let envelope = RequestEnvelope::new(partner_id, application);

    let wire_charset = charset::default_wire_charset();
    let markup = document::request_to_markup(&envelope, wire_charset.name())?;
    let wire = charset::encode_to_wire(&markup, wire_charset)?;

    match schema::validate_with_file(schema_path.clone(), wire).await {
        Ok(()) => {
            println!("{} conforms to {}", application_path, schema_path.display());
            Ok(())
        }
        Err(ExchangeError::ValidationError { messages }) => {
            println!("Found {} violations:", messages.len());
            for message in &messages {
                println!("- {}", message);
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
