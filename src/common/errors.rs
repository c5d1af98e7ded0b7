//! Error types for the application

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::AccountType;

/// Result type alias using our OpsError
pub type Result<T> = std::result::Result<T, OpsError>;

/// Exchange error code returned when a cancel-all finds nothing to cancel
pub const NO_OPEN_ORDERS_CODE: i64 = -2011;

/// Exchange error codes that indicate a credential problem (bad signature,
/// bad API key, key without permission). Retrying these cannot succeed.
const CREDENTIAL_ERROR_CODES: [i64; 3] = [-1022, -2014, -2015];

/// Exchange error code for a request that failed a symbol filter
const FILTER_FAILURE_CODE: i64 = -1013;

/// Exchange error codes for malformed requests (bad parameter, bad
/// precision, unknown symbol). The same request fails the same way again.
const REQUEST_ERROR_CODES: std::ops::RangeInclusive<i64> = -1199..=-1100;

fn is_fatal_exchange_code(code: i64) -> bool {
    CREDENTIAL_ERROR_CODES.contains(&code)
        || REQUEST_ERROR_CODES.contains(&code)
        || code == FILTER_FAILURE_CODE
}

/// Main error type for account operations
#[derive(Error, Debug)]
pub enum OpsError {
    /// Malformed input, unsupported account-type pair, non-positive amounts
    #[error("Validation error: {0}")]
    Validation(String),

    /// Arithmetic on quantities could not be performed (bad step size, unparsable number)
    #[error("Calculation error: {0}")]
    Calculation(String),

    /// Pre-flight balance check failed
    #[error("Insufficient {asset} balance in {account} account: available {available}, required {required}")]
    InsufficientBalance {
        asset: String,
        account: AccountType,
        available: Decimal,
        required: Decimal,
    },

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded: {message}, retry after {retry_after_seconds:?} seconds")]
    RateLimit {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    /// Error payload returned by the exchange
    #[error("Exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    /// The exchange accepted the request but refused the operation
    #[error("Operation rejected: {0}")]
    Rejected(String),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The operation was stopped through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OpsError {
    /// Whether the convergence engine may retry after this error.
    ///
    /// Transient gateway failures (transport, rate limits, exchange-side
    /// refusals) are retryable. Input, balance and credential problems are not,
    /// nor are exchange codes for malformed or filter-rejected requests.
    pub fn is_retryable(&self) -> bool {
        match self {
            OpsError::HttpRequest(_)
            | OpsError::RateLimit { .. }
            | OpsError::Rejected(_)
            | OpsError::InvalidResponse(_)
            | OpsError::Timeout(_) => true,
            OpsError::Exchange { code, .. } => !is_fatal_exchange_code(*code),
            OpsError::Validation(_)
            | OpsError::Calculation(_)
            | OpsError::InsufficientBalance { .. }
            | OpsError::JsonParse(_)
            | OpsError::Authentication(_)
            | OpsError::Configuration(_)
            | OpsError::Cancelled
            | OpsError::Internal(_) => false,
        }
    }

    /// Exchange error code, if this error carries one
    pub fn exchange_code(&self) -> Option<i64> {
        match self {
            OpsError::Exchange { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this is the exchange's "no open orders" response to a cancel
    pub fn is_no_open_orders(&self) -> bool {
        self.exchange_code() == Some(NO_OPEN_ORDERS_CODE)
    }
}
