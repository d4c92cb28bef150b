//! Signed message envelope.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! magic "BKIE" | version u8 | flags u8 | payload_len u32 | payload
//! [ signer_key 32 | signed_at i64 | signature 64 ]   -- when flags & SIGNED
//! ```
//!
//! The signature covers `DOMAIN || signed_at || payload`. The envelope carries
//! the signer's public key, so building one needs nothing but our own key.

use std::fmt;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::errors::ExchangeError;

const MAGIC: &[u8; 4] = b"BKIE";
const FORMAT_VERSION: u8 = 1;
const FLAG_SIGNED: u8 = 0b0000_0001;
const DOMAIN: &[u8] = b"bki-envelope/v1";

const HEADER_LEN: usize = 4 + 1 + 1 + 4;
const SIGNER_INFO_LEN: usize = 32 + 8 + 64;

/// Result of checking a received envelope's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Signed by a trusted key and the signature matches.
    Verified,
    /// A signature is present but does not match, or the signer is not trusted.
    VerificationFailed,
    /// The envelope carries no signature at all.
    Unsigned,
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyOutcome::Verified => f.write_str("verified"),
            VerifyOutcome::VerificationFailed => f.write_str("signature verification failed"),
            VerifyOutcome::Unsigned => f.write_str("unsigned"),
        }
    }
}

/// The caller's signing identity plus the keys it trusts for replies.
///
/// Held by one client instance only; several clients with different
/// certificates can coexist.
#[derive(Clone)]
pub struct Certificate {
    signing_key: SigningKey,
    trusted: Vec<VerifyingKey>,
}

impl Certificate {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
            trusted: Vec::new(),
        }
    }

    /// Creates a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            trusted: Vec::new(),
        }
    }

    /// Hex-encoded seed, the format [`Certificate::load`] reads.
    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Parses a hex-encoded 32-byte seed (surrounding whitespace ignored).
    pub fn from_hex(seed_hex: &str) -> Result<Self, ExchangeError> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| ExchangeError::InvalidKey(format!("signing key is not hex: {}", e)))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ExchangeError::InvalidKey(format!("signing key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Loads a hex seed from a key file.
    pub fn load(path: &Path) -> Result<Self, ExchangeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExchangeError::InvalidKey(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_hex(&content)
    }

    /// Adds a gateway key whose signatures on replies are accepted.
    pub fn with_trusted_key(mut self, key: VerifyingKey) -> Self {
        if !self.trusted.contains(&key) {
            self.trusted.push(key);
        }
        self
    }

    /// Adds a hex-encoded gateway key.
    pub fn with_trusted_key_hex(self, key_hex: &str) -> Result<Self, ExchangeError> {
        Ok(self.with_trusted_key(parse_public_key(key_hex)?))
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// SHA-256 of the public key, hex encoded.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public_key())
    }

    fn trusts(&self, key: &VerifyingKey) -> bool {
        *key == self.public_key() || self.trusted.contains(key)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("fingerprint", &self.fingerprint())
            .field("trusted_keys", &self.trusted.len())
            .finish()
    }
}

/// Parses a hex-encoded Ed25519 public key.
pub fn parse_public_key(key_hex: &str) -> Result<VerifyingKey, ExchangeError> {
    let bytes = hex::decode(key_hex.trim())
        .map_err(|e| ExchangeError::InvalidKey(format!("public key is not hex: {}", e)))?;
    let raw: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        ExchangeError::InvalidKey(format!("public key must be 32 bytes, got {}", bytes.len()))
    })?;
    VerifyingKey::from_bytes(&raw)
        .map_err(|e| ExchangeError::InvalidKey(format!("not an Ed25519 public key: {}", e)))
}

pub fn fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn signed_message(signed_at: i64, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN.len() + 8 + payload.len());
    message.extend_from_slice(DOMAIN);
    message.extend_from_slice(&signed_at.to_be_bytes());
    message.extend_from_slice(payload);
    message
}

fn frame(payload: &[u8], flags: u8) -> Result<Vec<u8>, ExchangeError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| ExchangeError::MalformedEnvelope("payload exceeds 4 GiB".into()))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + SIGNER_INFO_LEN);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(flags);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Wraps `payload` in an envelope signed by `certificate` at `signed_at` (unix seconds).
pub fn sign_at(payload: &[u8], certificate: &Certificate, signed_at: i64) -> Result<Vec<u8>, ExchangeError> {
    let signature = certificate
        .signing_key
        .sign(&signed_message(signed_at, payload));

    let mut out = frame(payload, FLAG_SIGNED)?;
    out.extend_from_slice(certificate.public_key().as_bytes());
    out.extend_from_slice(&signed_at.to_be_bytes());
    out.extend_from_slice(&signature.to_bytes());
    Ok(out)
}

/// Wraps `payload` in an envelope signed by `certificate` now.
pub fn sign(payload: &[u8], certificate: &Certificate) -> Result<Vec<u8>, ExchangeError> {
    sign_at(payload, certificate, chrono::Utc::now().timestamp())
}

/// Wraps `payload` without any signature.
pub fn wrap_unsigned(payload: &[u8]) -> Result<Vec<u8>, ExchangeError> {
    frame(payload, 0)
}

struct SignerInfo {
    key: [u8; 32],
    signed_at: i64,
    signature: [u8; 64],
}

fn read_signer_info(bytes: &[u8]) -> Result<SignerInfo, ExchangeError> {
    if bytes.len() != SIGNER_INFO_LEN {
        return Err(ExchangeError::MalformedEnvelope(format!(
            "signer info is {} bytes, expected {}",
            bytes.len(),
            SIGNER_INFO_LEN
        )));
    }
    let (key, rest) = bytes.split_at(32);
    let (signed_at, signature) = rest.split_at(8);
    let malformed = |_| ExchangeError::MalformedEnvelope("signer info truncated".into());
    Ok(SignerInfo {
        key: key.try_into().map_err(malformed)?,
        signed_at: i64::from_be_bytes(signed_at.try_into().map_err(malformed)?),
        signature: signature.try_into().map_err(malformed)?,
    })
}

/// Extracts the payload and classifies the signature.
///
/// The payload is returned whatever the outcome; only broken framing is an
/// error. Checking the outcome is the caller's policy.
pub fn open_and_verify(
    envelope: &[u8],
    certificate: &Certificate,
) -> Result<(Vec<u8>, VerifyOutcome), ExchangeError> {
    if envelope.len() < HEADER_LEN || &envelope[..4] != MAGIC {
        return Err(ExchangeError::MalformedEnvelope(
            "not a signed envelope (bad magic)".into(),
        ));
    }
    let version = envelope[4];
    if version != FORMAT_VERSION {
        return Err(ExchangeError::MalformedEnvelope(format!(
            "unsupported envelope version {}",
            version
        )));
    }
    let flags = envelope[5];
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&envelope[6..HEADER_LEN]);
    let payload_len = u32::from_be_bytes(len_bytes) as usize;

    let body = &envelope[HEADER_LEN..];
    if body.len() < payload_len {
        return Err(ExchangeError::MalformedEnvelope(format!(
            "payload truncated: {} of {} bytes",
            body.len(),
            payload_len
        )));
    }
    let (payload, trailer) = body.split_at(payload_len);

    if flags & FLAG_SIGNED == 0 {
        if !trailer.is_empty() {
            return Err(ExchangeError::MalformedEnvelope(
                "trailing bytes after unsigned payload".into(),
            ));
        }
        return Ok((payload.to_vec(), VerifyOutcome::Unsigned));
    }

    let info = read_signer_info(trailer)?;
    let outcome = match VerifyingKey::from_bytes(&info.key) {
        Ok(key) if certificate.trusts(&key) => {
            let signature = Signature::from_bytes(&info.signature);
            match key.verify_strict(&signed_message(info.signed_at, payload), &signature) {
                Ok(()) => VerifyOutcome::Verified,
                Err(_) => VerifyOutcome::VerificationFailed,
            }
        }
        Ok(key) => {
            tracing::warn!("Envelope signed by untrusted key {}", fingerprint(&key));
            VerifyOutcome::VerificationFailed
        }
        Err(_) => VerifyOutcome::VerificationFailed,
    };

    Ok((payload.to_vec(), outcome))
}
