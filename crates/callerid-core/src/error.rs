//! Error types for caller identity lookup.
//!
//! Each capability has its own error enum so that implementations only have to
//! describe the failures they can actually produce. The unified [`Error`] wraps
//! them for the service layer.
//!
//! ## Error Cases
//! - [`NormalizationError`]: the raw number could not be turned into E.164.
//! - [`LookupError`]: the remote directory failed to answer.
//! - [`CacheError`]: the contact cache rejected a read or write.
//! - [`ImageError`]: a contact photo could not be fetched or decoded.

pub type Result<T> = core::result::Result<T, Error>;

/// Failure to canonicalize a raw phone number.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    /// Nothing left after trimming.
    #[error("phone number is empty")]
    Empty,

    /// A character that is neither a digit nor a visual separator.
    #[error("invalid character {ch:?} in phone number")]
    InvalidCharacter { ch: char },

    /// The country hint has no numbering rules.
    #[error("unsupported country {iso:?}")]
    UnsupportedCountry { iso: String },

    /// The national significant number is too short or too long.
    #[error("invalid phone number length ({digits} digits)")]
    InvalidLength { digits: usize },

    /// International numbers cannot start with a zero country code.
    #[error("invalid country calling code")]
    InvalidCountryCode,
}

/// Failure reported by a [`RemoteLookupClient`](crate::RemoteLookupClient).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// The directory answered with an error.
    #[error("remote lookup failed: {reason}")]
    Remote { reason: String },

    /// The request never reached the directory.
    #[error("transport error: {reason}")]
    Transport { reason: String },
}

/// Failure reported by a [`CacheStore`](crate::CacheStore).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("cache rejected write for {number}: {reason}")]
    WriteRejected { number: String, reason: String },
}

/// Failure while fetching or decoding a contact photo.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("invalid image url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{scheme} scheme not supported for image lookups")]
    UnsupportedScheme { scheme: String },

    /// The content resolver had nothing to read for the URI.
    #[error("no content available for {uri:?}")]
    NoContent { uri: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Remote(#[from] LookupError),

    #[error("image decode failed: {reason}")]
    Decode { reason: String },
}

/// Unified error type for the lookup service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Image(#[from] ImageError),
}
