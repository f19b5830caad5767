//! Rust client core for the ezPay e-invoice API (issue, search, invalidation).
//!
//! Requests are merged with the common fields, encrypted with AES-256-CBC and
//! posted as `MerchantID_`/`PostData_`; responses are authenticated through
//! their SHA-256 check code.
//!
//! # Examples
//! ```rust
//! use ezpay_core::config::{Config, EnvironmentType};
//!
//! let config = Config::new(EnvironmentType::Testing);
//! # let _ = config;
//! ```
pub mod api;
pub mod checkcode;
pub mod config;
pub mod crypto;
pub mod invoice;
pub mod params;
pub mod transport;

use thiserror::Error;

pub use api::{EzpayClient, EzpayError, InvoiceProvider, InvoiceResponse, MerchantCredentials};
pub use params::{ParamValue, Params};

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] api::EzpayError),
    #[error(transparent)]
    Crypto(#[from] crypto::CryptoError),
    #[error(transparent)]
    CheckCode(#[from] checkcode::CheckCodeError),
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
    #[error(transparent)]
    Invoice(#[from] invoice::InvoiceError),
    #[error(transparent)]
    Environment(#[from] config::EnvironmentParseError),
}
