//! Configuration and environment selection.
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};
use thiserror::Error;

/// ezPay environment selection for API endpoints.
/// - Testing: the merchant test platform (`cinv`), no invoices are actually issued.
/// - Production: the live platform (`inv`).
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use ezpay_core::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("production")?;
/// assert_eq!(env, EnvironmentType::Production);
/// # Ok::<(), ezpay_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentType {
    Testing,
    Production,
}

/// Error returned when parsing an [`EnvironmentType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment type: {input}")]
    Invalid { input: String },
}

impl FromStr for EnvironmentType {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<EnvironmentType, EnvironmentParseError> {
        match env.trim().to_ascii_lowercase().as_str() {
            "testing" | "test" => Ok(EnvironmentType::Testing),
            "production" | "prod" => Ok(EnvironmentType::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Testing => "testing",
            EnvironmentType::Production => "production",
        }
    }

    pub fn endpoint_url(&self) -> &'static str {
        match self {
            EnvironmentType::Testing => "https://cinv.ezpay.com.tw/Api/",
            EnvironmentType::Production => "https://inv.ezpay.com.tw/Api/",
        }
    }
}

pub const DEFAULT_SUCCESS_CODE: &str = "SUCCESS";
pub const DEFAULT_RESPONSE_TYPE: &str = "JSON";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Service settings used when building requests and reading responses.
///
/// # Examples
/// ```rust
/// use std::time::Duration;
/// use ezpay_core::config::{Config, EnvironmentType};
///
/// let config = Config::new(EnvironmentType::Testing).with_timeout(Duration::from_secs(10));
/// assert_eq!(config.success_code(), "SUCCESS");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    env: EnvironmentType,
    base_url: Option<String>,
    success_code: String,
    response_type: String,
    timeout: Duration,
}

impl Config {
    pub fn new(env: EnvironmentType) -> Self {
        Self {
            env,
            base_url: None,
            success_code: DEFAULT_SUCCESS_CODE.to_string(),
            response_type: DEFAULT_RESPONSE_TYPE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Send requests somewhere other than the environment's endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_success_code(mut self, success_code: impl Into<String>) -> Self {
        self.success_code = success_code.into();
        self
    }

    /// `RespondType` sent with every request. `JSON` responses are decoded as
    /// JSON; any other value is read as a `key=value&...` string.
    pub fn with_response_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = response_type.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn success_code(&self) -> &str {
        &self.success_code
    }

    pub fn response_type(&self) -> &str {
        &self.response_type
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(EnvironmentType::Testing)
    }
}
