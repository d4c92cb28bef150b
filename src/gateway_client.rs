use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::charset;
use crate::config::ClientConfig;
use crate::document;
use crate::errors::{ExchangeError, UnverifiedReply};
use crate::models::{ApplicationDocument, ReportResponse, RequestEnvelope, ResponseEnvelope};
use crate::schema;
use crate::signing::{self, Certificate, VerifyOutcome};
use crate::transport::HttpTransport;

/// Client for exchanging credit-report requests with the bureau gateway.
///
/// Holds its configuration and certificate read-only, so one client can run
/// any number of exchanges concurrently.
pub struct BkiGatewayClient {
    config: ClientConfig,
    certificate: Certificate,
    transport: HttpTransport,
    audit: Option<AuditSink>,
}

impl BkiGatewayClient {
    /// Creates a new `BkiGatewayClient`.
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint, partner id and pipeline options.
    /// * `certificate` - Our signing key; gateway keys listed in
    ///   `config.trusted_gateway_keys` are added to its trusted set.
    pub fn new(config: ClientConfig, certificate: Certificate) -> Result<Self, ExchangeError> {
        let mut certificate = certificate;
        for key in &config.trusted_gateway_keys {
            certificate = certificate.with_trusted_key_hex(key)?;
        }

        let transport = HttpTransport::new(config.endpoint.clone(), config.request_timeout)?;
        let audit = config
            .save_requests
            .then(|| AuditSink::new(config.audit_dir.clone()));

        tracing::info!(
            "BKI gateway client ready for partner {} (key {})",
            config.partner_id,
            certificate.fingerprint()
        );

        Ok(Self {
            config,
            certificate,
            transport,
            audit,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs one exchange and returns the bureau's report response.
    ///
    /// A reply carrying a business-level rejection code is still `Ok`; only
    /// pipeline failures are errors.
    pub async fn exchange(&self, application: ApplicationDocument) -> Result<ReportResponse, ExchangeError> {
        self.exchange_envelope(application)
            .await
            .map(|envelope| envelope.response)
    }

    /// Like [`exchange`](Self::exchange), with a deadline on the network stage.
    ///
    /// Expiry fails with `TransportFailure { kind: Timeout }`; no later stage runs.
    pub async fn exchange_with_timeout(
        &self,
        application: ApplicationDocument,
        deadline: Duration,
    ) -> Result<ReportResponse, ExchangeError> {
        self.run(application, Some(deadline))
            .await
            .map(|envelope| envelope.response)
    }

    /// Runs one exchange and returns the whole reply envelope.
    pub async fn exchange_envelope(
        &self,
        application: ApplicationDocument,
    ) -> Result<ResponseEnvelope, ExchangeError> {
        self.run(application, None).await
    }

    async fn run(
        &self,
        application: ApplicationDocument,
        deadline: Option<Duration>,
    ) -> Result<ResponseEnvelope, ExchangeError> {
        let exchange_id = Uuid::new_v4();
        let span = tracing::info_span!("exchange", id = %exchange_id);

        async move {
            tracing::info!(
                "Starting exchange for request {}",
                application.request_number
            );
            let signed = self.prepare(application).await?;

            if let Some(audit) = &self.audit {
                audit.record(&signed, exchange_id).await;
            }

            let reply = match deadline {
                Some(deadline) => tokio::time::timeout(deadline, self.transport.send(&signed))
                    .await
                    .map_err(|_| {
                        ExchangeError::timeout(format!("no reply within {:?}", deadline))
                    })??,
                None => self.transport.send(&signed).await?,
            };

            let envelope = self.interpret(&reply)?;
            tracing::info!(
                "Exchange finished with response code {}",
                envelope.response.code.code()
            );
            Ok(envelope)
        }
        .instrument(span)
        .await
    }

    /// Serialize, transcode, validate and sign.
    async fn prepare(&self, application: ApplicationDocument) -> Result<Vec<u8>, ExchangeError> {
        let wire_charset = charset::default_wire_charset();
        let envelope = RequestEnvelope::new(self.config.partner_id.clone(), application);

        let markup = document::request_to_markup(&envelope, wire_charset.name())?;
        let wire = charset::encode_to_wire(&markup, wire_charset)?;
        tracing::debug!("Request document is {} bytes of {}", wire.len(), wire_charset.name());

        match &self.config.schema_path {
            Some(path) => {
                schema::validate_with_file(path.clone(), wire.clone()).await?;
                tracing::debug!("Request conforms to {}", path.display());
            }
            None => tracing::debug!("No schema configured, skipping validation"),
        }

        let signed = signing::sign(&wire, &self.certificate)?;
        tracing::debug!("Signed envelope is {} bytes", signed.len());
        Ok(signed)
    }

    /// Unwrap, verify and decode a reply envelope.
    fn interpret(&self, reply: &[u8]) -> Result<ResponseEnvelope, ExchangeError> {
        let (payload, outcome) = signing::open_and_verify(reply, &self.certificate)?;

        let trusted = match outcome {
            VerifyOutcome::Verified => true,
            VerifyOutcome::Unsigned if self.config.allow_unsigned_replies => {
                tracing::warn!("Accepting unsigned reply");
                true
            }
            VerifyOutcome::Unsigned | VerifyOutcome::VerificationFailed => false,
        };

        if !trusted {
            tracing::error!("Reply signature check ended as {}", outcome);
            let text = charset::decode_from_wire(&payload, self.config.reply_charset).ok();
            let response = text
                .as_deref()
                .and_then(|text| document::response_from_markup(text).ok());
            return Err(ExchangeError::InvalidCertificate(Box::new(UnverifiedReply {
                outcome,
                payload,
                text,
                response,
            })));
        }

        let text = charset::decode_from_wire(&payload, self.config.reply_charset)?;
        document::response_from_markup(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::RequestReason;
    use crate::models::{Person, ResponseCode, Subject};
    use chrono::NaiveDate;

    fn application() -> ApplicationDocument {
        let person = Person {
            last_name: "Петров".into(),
            first_name: "Пётр".into(),
            middle_name: None,
            gender: None,
            birthday: NaiveDate::from_ymd_opt(1975, 6, 1).unwrap(),
            birthplace: "Тула".into(),
            document: None,
            inn: None,
            snils: None,
        };
        ApplicationDocument::new(
            7,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "1",
            Subject::Person(person),
            RequestReason::CreditApplication,
        )
    }

    fn client(config: ClientConfig) -> BkiGatewayClient {
        BkiGatewayClient::new(config, Certificate::from_seed([7; 32])).unwrap()
    }

    fn reply_markup() -> String {
        document::response_to_markup(
            &ResponseEnvelope {
                version: "3.4".into(),
                partner_id: "P-1".into(),
                timestamp: "2024-01-15T10:00:00".into(),
                response: ReportResponse {
                    number: Some("7".into()),
                    code: ResponseCode::Accepted,
                    text: "OK".into(),
                    sections: Vec::new(),
                },
            },
            "windows-1251",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_prepare_produces_verifiable_envelope() {
        let client = client(ClientConfig::new("http://localhost:1", "P-1"));
        let signed = client.prepare(application()).await.unwrap();
        let (payload, outcome) = signing::open_and_verify(&signed, &client.certificate).unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
        let text = charset::decode_from_wire(&payload, charset::default_wire_charset()).unwrap();
        assert!(text.starts_with(r#"<?xml version="1.0" encoding="windows-1251"?>"#));
        assert!(text.contains("Петров"));
    }

    #[test]
    fn test_unsigned_reply_policy() {
        let wire = charset::encode_to_wire(&reply_markup(), charset::default_wire_charset()).unwrap();
        let unsigned = signing::wrap_unsigned(&wire).unwrap();

        let strict = client(ClientConfig::new("http://localhost:1", "P-1"));
        match strict.interpret(&unsigned) {
            Err(ExchangeError::InvalidCertificate(reply)) => {
                assert_eq!(reply.outcome, VerifyOutcome::Unsigned);
                assert!(reply.text.as_deref().unwrap().contains("responsecode"));
                assert!(reply.response.is_some());
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let lenient = client(
            ClientConfig::new("http://localhost:1", "P-1").with_unsigned_replies_allowed(true),
        );
        let envelope = lenient.interpret(&unsigned).unwrap();
        assert!(envelope.response.code.is_accepted());
    }

    #[test]
    fn test_bad_gateway_key_rejected_at_construction() {
        let config = ClientConfig::new("http://localhost:1", "P-1").with_trusted_gateway_key("xyz");
        assert!(matches!(
            BkiGatewayClient::new(config, Certificate::from_seed([1; 32])),
            Err(ExchangeError::InvalidKey(_))
        ));
    }
}
