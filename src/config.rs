use std::path::PathBuf;
use std::time::Duration;

use encoding_rs::Encoding;

use crate::charset;

/// Default deadline for one HTTP round trip to the gateway.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Read-only settings of one gateway client.
///
/// The signing certificate is deliberately not part of this struct: it is
/// loaded by the caller (see `certificate_path`) and moved into
/// [`BkiGatewayClient::new`](crate::gateway_client::BkiGatewayClient::new).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub partner_id: String,
    /// Schema for request validation; `None` skips the stage.
    pub schema_path: Option<PathBuf>,
    /// Persist each signed outgoing envelope to `audit_dir`.
    pub save_requests: bool,
    pub audit_dir: PathBuf,
    pub request_timeout: Duration,
    /// Accept replies that carry no signature at all.
    pub allow_unsigned_replies: bool,
    /// Charset assumed for replies that declare none.
    pub reply_charset: &'static Encoding,
    pub certificate_path: Option<PathBuf>,
    /// Hex-encoded gateway public keys trusted for reply signatures.
    pub trusted_gateway_keys: Vec<String>,
}

impl ClientConfig {
    /// Programmatic defaults: no schema, no audit copies, 30 second timeout,
    /// signed replies required, windows-1251 replies.
    pub fn new(endpoint: impl Into<String>, partner_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            partner_id: partner_id.into(),
            schema_path: None,
            save_requests: false,
            audit_dir: PathBuf::from("requests"),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            allow_unsigned_replies: false,
            reply_charset: charset::default_wire_charset(),
            certificate_path: None,
            trusted_gateway_keys: Vec::new(),
        }
    }

    pub fn with_schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    /// Enables audit copies of signed envelopes under `dir`.
    pub fn with_audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_requests = true;
        self.audit_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_unsigned_replies_allowed(mut self, allowed: bool) -> Self {
        self.allow_unsigned_replies = allowed;
        self
    }

    pub fn with_reply_charset(mut self, charset: &'static Encoding) -> Self {
        self.reply_charset = charset;
        self
    }

    pub fn with_certificate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate_path = Some(path.into());
        self
    }

    pub fn with_trusted_gateway_key(mut self, key_hex: impl Into<String>) -> Self {
        self.trusted_gateway_keys.push(key_hex.into());
        self
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let endpoint = std::env::var("BKI_GATEWAY_URL")
            .map_err(|_| anyhow::anyhow!("BKI_GATEWAY_URL environment variable required"))
            .and_then(|raw| {
                if raw.trim().is_empty() {
                    anyhow::bail!("BKI_GATEWAY_URL cannot be empty");
                }
                let url = url::Url::parse(raw.trim())
                    .map_err(|e| anyhow::anyhow!("BKI_GATEWAY_URL is not a valid URL: {}", e))?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    anyhow::bail!("BKI_GATEWAY_URL must start with http:// or https://");
                }
                Ok(raw.trim().to_string())
            })?;

        let partner_id = std::env::var("BKI_PARTNER_ID")
            .map_err(|_| anyhow::anyhow!("BKI_PARTNER_ID environment variable required"))
            .and_then(|id| {
                if id.trim().is_empty() {
                    anyhow::bail!("BKI_PARTNER_ID cannot be empty");
                }
                Ok(id.trim().to_string())
            })?;

        let mut config = Self::new(endpoint, partner_id);

        config.certificate_path = optional_var("BKI_SIGNING_KEY_PATH").map(PathBuf::from);
        config.schema_path = optional_var("BKI_SCHEMA_PATH").map(PathBuf::from);
        config.save_requests = flag_var("BKI_SAVE_REQUESTS")?;
        if let Some(dir) = optional_var("BKI_AUDIT_DIR") {
            config.audit_dir = PathBuf::from(dir);
        }
        config.allow_unsigned_replies = flag_var("BKI_ALLOW_UNSIGNED_REPLIES")?;

        if let Some(secs) = optional_var("BKI_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| anyhow::anyhow!("BKI_TIMEOUT_SECS must be a whole number of seconds"))?;
            if secs == 0 {
                anyhow::bail!("BKI_TIMEOUT_SECS must be greater than zero");
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(label) = optional_var("BKI_REPLY_CHARSET") {
            config.reply_charset = charset::charset_for_label(&label)
                .map_err(|_| anyhow::anyhow!("BKI_REPLY_CHARSET '{}' is not a known charset", label))?;
        }

        if let Some(keys) = optional_var("BKI_GATEWAY_PUBLIC_KEYS") {
            for key in keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
                if key.len() != 64 || hex::decode(key).is_err() {
                    anyhow::bail!("BKI_GATEWAY_PUBLIC_KEYS entries must be 64 hex characters");
                }
                config.trusted_gateway_keys.push(key.to_string());
            }
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Gateway endpoint: {}", config.endpoint);
        tracing::debug!("Partner id: {}", config.partner_id);
        match &config.schema_path {
            Some(path) => tracing::info!("Request validation enabled: {}", path.display()),
            None => tracing::info!("Request validation disabled"),
        }
        if config.save_requests {
            tracing::info!("Audit copies go to {}", config.audit_dir.display());
        }
        tracing::debug!("Request timeout: {:?}", config.request_timeout);
        tracing::debug!("Trusted gateway keys: {}", config.trusted_gateway_keys.len());

        Ok(config)
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn flag_var(name: &str) -> anyhow::Result<bool> {
    match optional_var(name).as_deref() {
        None => Ok(false),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => anyhow::bail!("{} must be true or false, got '{}'", name, other),
    }
}
