use anyhow::Context;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bki_exchange::errors::ExchangeError;
use bki_exchange::models::{ApplicationDocument, ReportResponse};
use bki_exchange::{BkiGatewayClient, Certificate, ClientConfig};

/// Renders a report response for the terminal.
///
/// Opaque sections are printed as received.
fn response_json(response: &ReportResponse) -> serde_json::Value {
    let sections: Vec<serde_json::Value> = response
        .sections
        .iter()
        .map(|section| {
            json!({
                "section": section.kind.element_name(),
                "content": String::from_utf8_lossy(&section.raw),
            })
        })
        .collect();

    json!({
        "number": response.number,
        "code": response.code.code(),
        "accepted": response.code.is_accepted(),
        "text": response.text,
        "sections": sections,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bki_exchange=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let application_path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: bki-exchange <application.json>"))?;

    // Load configuration
    let config = ClientConfig::from_env()?;

    let key_path = config
        .certificate_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("BKI_SIGNING_KEY_PATH environment variable required"))?;
    let certificate = Certificate::load(&key_path)?;
    tracing::info!("Signing key loaded: {}", certificate.fingerprint());

    let raw = tokio::fs::read_to_string(&application_path)
        .await
        .with_context(|| format!("cannot read {}", application_path))?;
    let application: ApplicationDocument = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid application record", application_path))?;

    let client = BkiGatewayClient::new(config, certificate)?;

    match client.exchange(application).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response_json(&response))?);
            Ok(())
        }
        Err(ExchangeError::InvalidCertificate(reply)) => {
            tracing::error!("Reply could not be trusted: {}", reply.outcome);
            if let Some(text) = &reply.text {
                eprintln!("{}", text);
            }
            anyhow::bail!("invalid certificate: reply is {}", reply.outcome)
        }
        Err(e) => Err(e.into()),
    }
}
