//! ezPay invoice API client and response types.
use std::fmt;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::{
    checkcode::{self, CheckCodeError, CheckCodeFields},
    config::Config,
    crypto::{self, CryptoError},
    params::{ParamValue, Params},
    transport::{HttpTransport, Transport, TransportError},
};

/// Errors returned by the ezPay API client.
#[derive(Debug, Error)]
pub enum EzpayError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    CheckCode(#[from] CheckCodeError),
    #[error("Invalid response from ezPay: {0}")]
    InvalidResponse(String),
    #[error("no completed invoice call yet; create, query or invalidate first")]
    ResponseNotReady,
    #[error("result field `{0}` is missing")]
    ResultFieldMissing(String),
    #[error("invoice lookup before invalidation failed ({status}): {message}")]
    VerificationQuery { status: String, message: String },
}

/// The three invoice API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Issue,
    Search,
    Invalid,
}

impl Operation {
    pub fn path(&self) -> &'static str {
        match self {
            Operation::Issue => "invoice_issue",
            Operation::Search => "invoice_search",
            Operation::Invalid => "invoice_invalid",
        }
    }

    /// API version each endpoint is spoken at.
    pub fn version(&self) -> &'static str {
        match self {
            Operation::Issue => "1.4",
            Operation::Search => "1.2",
            Operation::Invalid => "1.0",
        }
    }
}

/// Merchant identity plus the shared secret used for encryption and check codes.
///
/// # Examples
/// ```rust
/// use ezpay_core::api::MerchantCredentials;
///
/// let creds = MerchantCredentials::new(
///     "32365158",
///     "abcdefghijklmnopqrstuvwxyzABCDEF", // HashKey, 32 bytes
///     "1234567890abcdef",                 // HashIV, 16 bytes
/// );
/// assert_eq!(creds.merchant_id(), "32365158");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct MerchantCredentials {
    merchant_id: String,
    hash_key: String,
    hash_iv: String,
}

impl MerchantCredentials {
    pub fn new(
        merchant_id: impl Into<String>,
        hash_key: impl Into<String>,
        hash_iv: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            hash_key: hash_key.into(),
            hash_iv: hash_iv.into(),
        }
    }

    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    pub fn hash_iv(&self) -> &str {
        &self.hash_iv
    }
}

impl fmt::Debug for MerchantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("merchant_id", &self.merchant_id)
            .field("hash_key", &"<redacted>")
            .field("hash_iv", &"<redacted>")
            .finish()
    }
}

/// Response body as returned by the service.
///
/// `Result` arrives either as an object or as a JSON document inside a string;
/// both decode to the same map. An empty `Result` becomes an empty map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    #[serde(rename = "Status", alias = "status")]
    status: String,
    #[serde(rename = "Message", alias = "message", default)]
    message: String,
    #[serde(
        rename = "Result",
        alias = "result",
        default,
        deserialize_with = "deserialize_result"
    )]
    result: Map<String, Value>,
}

impl RawResponse {
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn result(&self) -> &Map<String, Value> {
        &self.result
    }

    /// Decode the `RespondType=String` form, `Status=...&Message=...&<result fields>`.
    ///
    /// Returns `None` when no `Status` field is present.
    pub fn from_query(text: &str) -> Option<Self> {
        let mut status = None;
        let mut message = String::new();
        let mut result = Map::new();
        for (key, value) in Params::parse_query(text) {
            let value = value.render().unwrap_or_default();
            match key.as_str() {
                "Status" | "status" => status = Some(value),
                "Message" | "message" => message = value,
                _ => {
                    result.insert(key, Value::String(value));
                }
            }
        }
        Some(Self {
            status: status?,
            message,
            result,
        })
    }
}

fn deserialize_result<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::Array(items) if items.is_empty() => Ok(Map::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(de::Error::custom(format!(
                "Result string is not a JSON object: {text}"
            ))),
        },
        other => Err(de::Error::custom(format!(
            "unexpected Result value: {other}"
        ))),
    }
}

/// Outcome of one completed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceResponse {
    success: bool,
    raw: RawResponse,
}

impl InvoiceResponse {
    pub fn from_raw(raw: RawResponse, success_code: &str) -> Self {
        Self {
            success: raw.status == success_code,
            raw,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn status(&self) -> &str {
        self.raw.status()
    }

    pub fn message(&self) -> &str {
        self.raw.message()
    }

    pub fn result(&self) -> &Map<String, Value> {
        self.raw.result()
    }

    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    /// One named field of the result.
    ///
    /// # Errors
    /// Returns [`EzpayError::ResultFieldMissing`] if the field is absent.
    pub fn result_field(&self, name: &str) -> Result<&Value, EzpayError> {
        self.result()
            .get(name)
            .ok_or_else(|| EzpayError::ResultFieldMissing(name.to_string()))
    }

    /// Like [`result_field`](Self::result_field), rendered as a string.
    pub fn result_str(&self, name: &str) -> Result<String, EzpayError> {
        self.result_field(name).and_then(|value| {
            checkcode::scalar_to_string(value)
                .ok_or_else(|| EzpayError::ResultFieldMissing(name.to_string()))
        })
    }

    /// The service message when the call did not succeed.
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.message())
        }
    }
}

/// Where the client's most recent call stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResponseState {
    #[default]
    Idle,
    AwaitingResponse(Operation),
    Ready(InvoiceResponse),
    Invalid(Operation),
}

/// Invoice operations offered by an e-invoice provider.
pub trait InvoiceProvider {
    type Error;

    fn create(&self, fields: Params) -> Result<InvoiceResponse, Self::Error>;
    fn query(&self, fields: Params) -> Result<InvoiceResponse, Self::Error>;
    fn invalidate(&self, fields: Params) -> Result<InvoiceResponse, Self::Error>;
}

enum Verification<'a> {
    /// Verify against the response's own result, when it carries a check code.
    OwnResult,
    /// Verify the response's check code against previously queried invoice data.
    Queried(&'a Map<String, Value>),
    Skipped,
}

/// ezPay e-invoice API client.
///
/// Every call is one blocking round trip and returns its own
/// [`InvoiceResponse`]. The latest outcome is also kept on the client and
/// can be read back through [`response`](Self::response).
///
/// # Examples
/// ```rust,no_run
/// use ezpay_core::api::{EzpayClient, EzpayError, MerchantCredentials};
/// use ezpay_core::config::Config;
/// use ezpay_core::params::Params;
///
/// let creds = MerchantCredentials::new("32365158", "abcdefghijklmnopqrstuvwxyzABCDEF", "1234567890abcdef");
/// let client = EzpayClient::new(Config::default(), creds)?;
/// let response = client.invalidate(
///     Params::new()
///         .with("InvoiceNumber", "AA00000076")
///         .with("InvalidReason", "order cancelled"),
/// )?;
/// println!("{}", response.status());
/// # Ok::<(), EzpayError>(())
/// ```
#[derive(Debug)]
pub struct EzpayClient<T = HttpTransport> {
    config: Config,
    credentials: MerchantCredentials,
    transport: T,
    base_url: String,
    state: Mutex<ResponseState>,
}

impl EzpayClient<HttpTransport> {
    /// Create a client talking HTTP to the configured environment.
    ///
    /// # Errors
    /// Returns [`EzpayError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: Config, credentials: MerchantCredentials) -> Result<Self, EzpayError> {
        let transport = HttpTransport::new(config.timeout())?;
        Ok(Self::with_transport(config, credentials, transport))
    }
}

// Public API
impl<T: Transport> EzpayClient<T> {
    /// Create a client over any [`Transport`].
    ///
    /// The endpoint base is the config's override, else `EZPAY_BASE_URL`,
    /// else the environment's endpoint.
    pub fn with_transport(config: Config, credentials: MerchantCredentials, transport: T) -> Self {
        let base_url = config
            .base_url()
            .map(str::to_string)
            .or_else(|| std::env::var("EZPAY_BASE_URL").ok())
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                if value.ends_with('/') {
                    value
                } else {
                    format!("{value}/")
                }
            })
            .unwrap_or_else(|| config.env().endpoint_url().to_string());

        Self {
            config,
            credentials,
            transport,
            base_url,
            state: Mutex::new(ResponseState::Idle),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn credentials(&self) -> &MerchantCredentials {
        &self.credentials
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue an invoice.
    ///
    /// # Errors
    /// Returns [`EzpayError`] for encryption, transport, parsing or check-code failures.
    pub fn create(&self, fields: impl Into<Params>) -> Result<InvoiceResponse, EzpayError> {
        self.execute(Operation::Issue, fields.into(), Verification::OwnResult)
    }

    /// Look up an invoice.
    ///
    /// # Errors
    /// Returns [`EzpayError`] for encryption, transport, parsing or check-code failures.
    pub fn query(&self, fields: impl Into<Params>) -> Result<InvoiceResponse, EzpayError> {
        self.execute(Operation::Search, fields.into(), Verification::OwnResult)
    }

    /// Void an invoice.
    ///
    /// With a `RandomNum` field the invoice is first looked up by number and
    /// random number, and the invalidation's check code is verified against
    /// that data. Without one, the invalidation response is accepted unverified.
    ///
    /// # Errors
    /// Returns [`EzpayError::VerificationQuery`] if the lookup does not succeed,
    /// and [`EzpayError`] for encryption, transport, parsing or check-code failures.
    pub fn invalidate(&self, fields: impl Into<Params>) -> Result<InvoiceResponse, EzpayError> {
        let fields = fields.into();
        let random_num = fields.get("RandomNum").filter(|value| !value.is_null());

        let Some(random_num) = random_num.cloned() else {
            return self.execute(Operation::Invalid, fields, Verification::Skipped);
        };

        let lookup = Params::new()
            .with("SearchType", 0)
            .with(
                "InvoiceNumber",
                fields
                    .get("InvoiceNumber")
                    .cloned()
                    .unwrap_or(ParamValue::Null),
            )
            .with("RandomNum", random_num);
        let found = self.query(lookup)?;
        if !found.is_success() {
            *self.state.lock() = ResponseState::Invalid(Operation::Invalid);
            return Err(EzpayError::VerificationQuery {
                status: found.status().to_string(),
                message: found.message().to_string(),
            });
        }

        self.execute(
            Operation::Invalid,
            fields,
            Verification::Queried(found.result()),
        )
    }

    /// Decrypt a `PostData_`-style payload sent by the service and parse its fields.
    ///
    /// # Errors
    /// Returns [`EzpayError::Crypto`] if the payload cannot be decrypted.
    pub fn decrypt_post_data(&self, payload: &str) -> Result<Params, EzpayError> {
        let plaintext = crypto::decrypt_hex(
            payload,
            self.credentials.hash_key().as_bytes(),
            self.credentials.hash_iv().as_bytes(),
        )?;
        Ok(Params::parse_query(&plaintext))
    }

    pub fn state(&self) -> ResponseState {
        self.state.lock().clone()
    }

    /// Latest completed response.
    ///
    /// # Errors
    /// Returns [`EzpayError::ResponseNotReady`] before any call has completed,
    /// while one is in flight, or after the last one failed.
    pub fn response(&self) -> Result<InvoiceResponse, EzpayError> {
        match &*self.state.lock() {
            ResponseState::Ready(response) => Ok(response.clone()),
            _ => Err(EzpayError::ResponseNotReady),
        }
    }

    pub fn is_success(&self) -> Result<bool, EzpayError> {
        self.response().map(|response| response.is_success())
    }

    /// Result object of the latest completed response.
    pub fn result(&self) -> Result<Map<String, Value>, EzpayError> {
        self.response().map(|response| response.result().clone())
    }

    /// One field of the latest completed response's result.
    pub fn result_field(&self, name: &str) -> Result<Value, EzpayError> {
        self.response()?.result_field(name).cloned()
    }
}

// Private API
impl<T: Transport> EzpayClient<T> {
    fn execute(
        &self,
        operation: Operation,
        fields: Params,
        verification: Verification<'_>,
    ) -> Result<InvoiceResponse, EzpayError> {
        *self.state.lock() = ResponseState::AwaitingResponse(operation);
        match self.round_trip(operation, fields, verification) {
            Ok(response) => {
                *self.state.lock() = ResponseState::Ready(response.clone());
                Ok(response)
            }
            Err(err) => {
                *self.state.lock() = ResponseState::Invalid(operation);
                Err(err)
            }
        }
    }

    fn round_trip(
        &self,
        operation: Operation,
        fields: Params,
        verification: Verification<'_>,
    ) -> Result<InvoiceResponse, EzpayError> {
        let params = self.merge_common_fields(operation, fields);
        let body = self.encode_request(&params)?;
        let url = self.build_endpoint(operation.path());
        debug!(
            endpoint = %url,
            version = operation.version(),
            fields = params.len(),
            body_len = body.len(),
            "sending invoice request"
        );

        let text = self.transport.post_form(&url, body)?;
        let response = self.parse_response(&text)?;
        info!(
            operation = ?operation,
            status = response.status(),
            success = response.is_success(),
            "invoice response received"
        );

        self.verify(&response, verification)?;
        Ok(response)
    }

    fn merge_common_fields(&self, operation: Operation, fields: Params) -> Params {
        let defaults = Params::new()
            .with("Version", operation.version())
            .with("RespondType", self.config.response_type())
            .with("TimeStamp", Utc::now().timestamp());
        Params::merge_defaults(defaults, fields)
    }

    fn encode_request(&self, params: &Params) -> Result<String, CryptoError> {
        let post_data = crypto::encrypt_hex(
            &params.encode(),
            self.credentials.hash_key().as_bytes(),
            self.credentials.hash_iv().as_bytes(),
        )?;
        Ok(form_urlencoded::Serializer::new(String::new())
            .append_pair("MerchantID_", self.credentials.merchant_id())
            .append_pair("PostData_", &post_data)
            .finish())
    }

    fn parse_response(&self, text: &str) -> Result<InvoiceResponse, EzpayError> {
        let raw = if self.config.response_type().eq_ignore_ascii_case("JSON") {
            serde_json::from_str::<RawResponse>(text.trim())
                .map_err(|err| EzpayError::InvalidResponse(format!("{err}: {text}")))?
        } else {
            RawResponse::from_query(text).ok_or_else(|| {
                EzpayError::InvalidResponse(format!("no Status field in response: {text}"))
            })?
        };
        Ok(InvoiceResponse::from_raw(raw, self.config.success_code()))
    }

    fn verify(
        &self,
        response: &InvoiceResponse,
        verification: Verification<'_>,
    ) -> Result<(), EzpayError> {
        if !response.is_success() {
            return Ok(());
        }
        let received = response
            .result()
            .get("CheckCode")
            .and_then(checkcode::scalar_to_string);

        match verification {
            Verification::Skipped => {
                warn!("invalidation without RandomNum, check code not verified");
                Ok(())
            }
            Verification::OwnResult => {
                let Some(received) = received else {
                    return Ok(());
                };
                let fields = CheckCodeFields::from_result(response.result())?;
                checkcode::verify_check_code(&fields, &self.credentials, &received)?;
                Ok(())
            }
            Verification::Queried(invoice) => {
                let received = received.ok_or(CheckCodeError::Missing)?;
                let fields = CheckCodeFields::from_result(invoice)?;
                checkcode::verify_check_code(&fields, &self.credentials, &received)?;
                Ok(())
            }
        }
    }

    fn build_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl<T: Transport> InvoiceProvider for EzpayClient<T> {
    type Error = EzpayError;

    fn create(&self, fields: Params) -> Result<InvoiceResponse, EzpayError> {
        EzpayClient::create(self, fields)
    }

    fn query(&self, fields: Params) -> Result<InvoiceResponse, EzpayError> {
        EzpayClient::query(self, fields)
    }

    fn invalidate(&self, fields: Params) -> Result<InvoiceResponse, EzpayError> {
        EzpayClient::invalidate(self, fields)
    }
}
