//! BKI Exchange Client Library
//!
//! This library implements the request/response exchange with a credit
//! bureau gateway: an application record is serialized to markup, transcoded
//! to the windows-1251 wire codepage, optionally validated against a schema,
//! signed, posted over HTTP, and the signed reply is verified and decoded.
//!
//! # Modules
//!
//! - `audit`: Audit copies of signed outgoing envelopes.
//! - `charset`: Wire codepage encoding and reply charset detection.
//! - `codes`: Closed enumerations of wire codes.
//! - `config`: Client configuration.
//! - `document`: Request and reply markup serialization.
//! - `errors`: Error handling types.
//! - `gateway_client`: Exchange orchestration against the bureau gateway.
//! - `markup`: Element tree reader and writer over `quick-xml`.
//! - `models`: Application record and reply data models.
//! - `schema`: Request validation against an XSD schema.
//! - `signing`: Signed message envelope and certificates.
//! - `transport`: HTTP delivery of envelopes.

pub mod audit;
pub mod charset;
pub mod codes;
pub mod config;
pub mod document;
pub mod errors;
pub mod gateway_client;
pub mod markup;
pub mod models;
pub mod schema;
pub mod signing;
pub mod transport;

pub use config::ClientConfig;
pub use errors::ExchangeError;
pub use gateway_client::BkiGatewayClient;
pub use signing::{Certificate, VerifyOutcome};
