use thiserror::Error;

/// Vault failures. All of these are fatal at startup: a service that
/// cannot read its accounts has nothing to dispatch on.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("failed to read credential file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write credential file `{path}`: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("credential envelope is malformed: {0}")]
    Envelope(String),

    #[error("unsupported key derivation `{0}`")]
    UnsupportedKdf(String),

    #[error("credential file failed to decrypt; wrong secret or corrupt file")]
    Decrypt,

    #[error("account list is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("credential file contains no accounts")]
    NoAccounts,

    #[error("accounts `{first}` and `{second}` share priority {priority}")]
    DuplicatePriority {
        priority: u32,
        first: String,
        second: String,
    },

    #[error("account `{0}` appears more than once")]
    DuplicateAccount(String),
}
