//! Error type for counter operations

use std::io::Error as IoError;

/// Errors returned by counters, stores and backends.
///
/// All failures are reported synchronously and leave state untouched.
#[derive(Debug)]
pub enum CounterError {
    /// Increment called with a negative amount
    InvalidAmount(i64),
    /// Caller bug: zero-length query, inverted interval, or a bucket step
    /// outside the representable calendar range
    InvalidArgument(String),
    /// Applying the amount would overflow a counter value
    Overflow {
        /// Value before the rejected increment
        current: i64,
        /// Amount that was rejected
        amount: i64,
    },
    /// Durable backend failure (I/O, encoding, corrupt record)
    Backend(String),
}

impl std::fmt::Display for CounterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterError::InvalidAmount(amount) => {
                write!(
                    f,
                    "Invalid amount: {} (counters only accept non-negative increments)",
                    amount
                )
            }
            CounterError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CounterError::Overflow { current, amount } => {
                write!(f, "Counter overflow: {} + {} exceeds i64::MAX", current, amount)
            }
            CounterError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for CounterError {}

impl From<IoError> for CounterError {
    fn from(e: IoError) -> Self {
        CounterError::Backend(format!("I/O error: {}", e))
    }
}

impl From<bincode::Error> for CounterError {
    fn from(e: bincode::Error) -> Self {
        CounterError::Backend(format!("codec error: {}", e))
    }
}

/// Result alias for counter operations
pub type Result<T> = std::result::Result<T, CounterError>;
