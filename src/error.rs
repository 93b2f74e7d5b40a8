//! Unified error type.

/// The error type returned by tether's fallible operations.
///
/// Application-level failures (403, 401, 404, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: storage lookups and writes, payload decoding,
/// invalid configuration, and binding or accepting connections.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key is absent or its entry has expired. The two are indistinguishable.
    #[error("key does not exist")]
    KeyNotExist,

    /// A storage backend failed to read or write.
    #[error("storage: {0}")]
    Storage(String),

    /// A session payload could not be encoded or decoded.
    #[error("session payload: {0}")]
    Codec(#[from] serde_json::Error),

    /// A rewrite or redirect glob did not compile.
    #[error("invalid rule `{pattern}`: {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A configuration value violates its documented constraints.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
