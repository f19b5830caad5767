//! Response check codes.
//!
//! The service signs a result by hashing a fixed field subset together with
//! the merchant's hash IV and key:
//!
//! ```text
//! SHA256("HashIV=" + iv + "&" + canonical(fields) + "&HashKey=" + key)
//! ```
//!
//! rendered as upper-case hex. Recomputing it proves the result came from
//! someone holding the shared secret.
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::api::MerchantCredentials;
use crate::params::Params;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckCodeError {
    #[error("check code mismatch (received {received}); response must not be trusted")]
    Mismatch { received: String },
    #[error("response result carries no CheckCode")]
    Missing,
    #[error("result field `{0}` required for the check code is missing")]
    MissingField(&'static str),
}

/// Transaction fields covered by the check code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckCodeFields {
    merchant_order_no: String,
    invoice_trans_no: String,
    total_amt: String,
    random_num: String,
}

impl CheckCodeFields {
    pub fn new(
        merchant_order_no: impl Into<String>,
        invoice_trans_no: impl Into<String>,
        total_amt: impl Into<String>,
        random_num: impl Into<String>,
    ) -> Self {
        Self {
            merchant_order_no: merchant_order_no.into(),
            invoice_trans_no: invoice_trans_no.into(),
            total_amt: total_amt.into(),
            random_num: random_num.into(),
        }
    }

    /// Pull the covered fields out of a response result object.
    pub fn from_result(result: &Map<String, Value>) -> Result<Self, CheckCodeError> {
        let field = |name: &'static str| {
            result
                .get(name)
                .and_then(scalar_to_string)
                .ok_or(CheckCodeError::MissingField(name))
        };
        Ok(Self {
            merchant_order_no: field("MerchantOrderNo")?,
            invoice_trans_no: field("InvoiceTransNo")?,
            total_amt: field("TotalAmt")?,
            random_num: field("RandomNum")?,
        })
    }

    pub fn merchant_order_no(&self) -> &str {
        &self.merchant_order_no
    }

    pub fn invoice_trans_no(&self) -> &str {
        &self.invoice_trans_no
    }

    pub fn total_amt(&self) -> &str {
        &self.total_amt
    }

    pub fn random_num(&self) -> &str {
        &self.random_num
    }

    /// Sorted `key=value&...` string the hash is computed over.
    pub fn check_string(&self, merchant_id: &str) -> String {
        Params::new()
            .with("MerchantID", merchant_id)
            .with("MerchantOrderNo", self.merchant_order_no.as_str())
            .with("InvoiceTransNo", self.invoice_trans_no.as_str())
            .with("TotalAmt", self.total_amt.as_str())
            .with("RandomNum", self.random_num.as_str())
            .canonical()
    }
}

/// Compute the upper-case hex check code for `fields`.
pub fn compute_check_code(fields: &CheckCodeFields, credentials: &MerchantCredentials) -> String {
    let check_str = fields.check_string(credentials.merchant_id());
    let mut hasher = Sha256::new();
    hasher.update(b"HashIV=");
    hasher.update(credentials.hash_iv().as_bytes());
    hasher.update(b"&");
    hasher.update(check_str.as_bytes());
    hasher.update(b"&HashKey=");
    hasher.update(credentials.hash_key().as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Compare the recomputed check code against the one the server sent.
///
/// # Errors
/// Returns [`CheckCodeError::Mismatch`] when the codes differ.
pub fn verify_check_code(
    fields: &CheckCodeFields,
    credentials: &MerchantCredentials,
    received: &str,
) -> Result<(), CheckCodeError> {
    let expected = compute_check_code(fields, credentials);
    if bool::from(expected.as_bytes().ct_eq(received.as_bytes())) {
        Ok(())
    } else {
        Err(CheckCodeError::Mismatch {
            received: received.to_string(),
        })
    }
}

/// String form of a JSON scalar; numbers keep their JSON spelling.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
