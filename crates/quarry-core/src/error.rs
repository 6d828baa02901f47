use thiserror::Error;

/// Classification of a failed warehouse call.
///
/// The driver's errors are opaque to the core except for this
/// classification, which decides whether a failure advances the account's
/// circuit breaker and whether the dispatch path fails over to the next
/// account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The warehouse rejected the account's credentials.
    AuthRejected,
    /// Connection-level failure: refused, reset, DNS.
    NetworkTransient,
    /// The call exceeded its deadline.
    Timeout,
    /// The statement itself was rejected: syntax, semantics, or a
    /// permission on an object. The account is fine.
    Query,
}

impl ErrorClass {
    /// Whether a failure of this class counts against the account.
    ///
    /// Query-level errors are the caller's problem and never trip the
    /// breaker or trigger failover.
    pub fn trips_breaker(self) -> bool {
        !matches!(self, ErrorClass::Query)
    }

    /// Whether a failure of this class invalidates the driver session it
    /// occurred on. The pool destroys invalidated sessions instead of
    /// returning them to the idle set.
    pub fn invalidates_session(self) -> bool {
        !matches!(self, ErrorClass::Query)
    }
}

/// An error reported by a driver session.
///
/// Opaque beyond its [`ErrorClass`]; the message is for logs and callers,
/// never for dispatch decisions.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    /// Classification hook for the dispatch path.
    pub class: ErrorClass,
    /// Human-readable detail from the driver.
    pub message: String,
}

impl DriverError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::AuthRejected, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NetworkTransient, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Timeout, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Query, message)
    }
}

/// Errors surfaced by the query-dispatch path.
///
/// Breaker-worthy failures (auth, network, timeout) never appear here
/// individually: the dispatch path fails over past them, and only when
/// every candidate is exhausted does the caller see
/// [`AccessError::NoAccountsAvailable`].
#[derive(Debug, Clone, Error)]
pub enum AccessError {
    /// Every candidate account was excluded by its breaker, inactive or
    /// in cooldown, or failed with a breaker-worthy error.
    #[error("no accounts available for dispatch")]
    NoAccountsAvailable,

    /// The statement failed on the selected account. Surfaced unchanged,
    /// without failover; no breaker advanced.
    #[error("query error on `{account}`: {source}")]
    Query {
        account: String,
        source: DriverError,
    },

    /// The requested template name is not in the catalog.
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),
}

impl AccessError {
    /// Returns true if this is a query-level error (no failover occurred).
    pub fn is_query(&self) -> bool {
        matches!(self, AccessError::Query { .. })
    }

    /// Returns true if dispatch exhausted every candidate account.
    pub fn is_no_accounts(&self) -> bool {
        matches!(self, AccessError::NoAccountsAvailable)
    }
}
