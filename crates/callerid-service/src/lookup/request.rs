use callerid_core::{
    Error, ImageLookupListener, LookupContext, NormalizationError, NumberLookupListener,
    PhoneNumberInfo, RemoteMatch,
};
use core::fmt;
use std::sync::Arc;

/// One call to
/// [`get_phone_number_info`](crate::PhoneNumberService::get_phone_number_info),
/// queued on the lookup pool.
pub struct LookupRequest {
    pub phone_number: String,
    pub is_incoming: bool,
    pub listener: Arc<dyn NumberLookupListener>,
    pub image_listener: Arc<dyn ImageLookupListener>,
}

impl fmt::Debug for LookupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupRequest")
            .field("phone_number", &self.phone_number)
            .field("is_incoming", &self.is_incoming)
            .finish_non_exhaustive()
    }
}

/// Photo download scheduled after a successful lookup, queued on the image
/// pool.
pub struct ImageFetchRequest {
    pub normalized_number: String,
    pub url: String,
    pub context: LookupContext,
    pub listener: Arc<dyn ImageLookupListener>,
}

impl fmt::Debug for ImageFetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFetchRequest")
            .field("normalized_number", &self.normalized_number)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// How a lookup ended.
///
/// Only [`Found`](Self::Found) and [`NotFound`](Self::NotFound) reach the
/// number listener; the other outcomes are logged and dropped.
#[derive(Debug)]
pub enum LookupOutcome {
    /// A named caller, from the cache or the remote directory.
    Found {
        info: PhoneNumberInfo,
        context: LookupContext,
    },
    /// The lookup ran to completion without identifying the caller.
    NotFound,
    /// Reverse lookup is switched off.
    Disabled,
    /// The input could not be turned into an E.164 number.
    InvalidNumber(NormalizationError),
    /// The lookup failed part-way.
    Failed(Error),
}

impl LookupOutcome {
    /// Whether the number listener is invoked for this outcome.
    pub const fn notifies_listener(&self) -> bool {
        matches!(self, Self::Found { .. } | Self::NotFound)
    }
}

impl From<RemoteMatch> for LookupOutcome {
    fn from(found: RemoteMatch) -> Self {
        Self::Found {
            info: found.info,
            context: found.context,
        }
    }
}

/// A cached answer carries no lookup context.
impl From<PhoneNumberInfo> for LookupOutcome {
    fn from(info: PhoneNumberInfo) -> Self {
        Self::Found {
            info,
            context: LookupContext::empty(),
        }
    }
}
