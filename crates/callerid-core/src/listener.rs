use crate::model::{DecodedImage, PhoneNumberInfo};

/// Receives the outcome of a number lookup.
///
/// Called at most once per request, from the service's single result
/// consumer. `None` means the lookup completed without finding anyone.
pub trait NumberLookupListener: Send + Sync {
    fn on_phone_number_info_complete(&self, info: Option<PhoneNumberInfo>);
}

/// Receives the contact photo for a lookup that found an image URL.
///
/// Called exactly once for every request that scheduled an image fetch, with
/// `None` if the photo could not be retrieved or decoded. Never called for
/// requests that did not schedule one.
pub trait ImageLookupListener: Send + Sync {
    fn on_image_fetch_complete(&self, image: Option<DecodedImage>);
}

impl<F> NumberLookupListener for F
where
    F: Fn(Option<PhoneNumberInfo>) + Send + Sync,
{
    fn on_phone_number_info_complete(&self, info: Option<PhoneNumberInfo>) {
        self(info);
    }
}

impl<F> ImageLookupListener for F
where
    F: Fn(Option<DecodedImage>) + Send + Sync,
{
    fn on_image_fetch_complete(&self, image: Option<DecodedImage>) {
        self(image);
    }
}
