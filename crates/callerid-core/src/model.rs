use bytes::Bytes;
use core::{any::Any, fmt};
use std::sync::Arc;

/// Category of a phone number as reported by the directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum PhoneType {
    Home,
    Work,
    Mobile,
    Business,
    #[default]
    Unknown,
}

/// Caller identity produced by a successful lookup.
///
/// A `PhoneNumberInfo` is immutable once built. It always carries the
/// normalized number it was resolved for, so a photo referenced by
/// [`image_url`](Self::image_url) can always be keyed in the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhoneNumberInfo {
    display_name: Option<String>,
    normalized_number: String,
    number: Option<String>,
    phone_type: PhoneType,
    phone_label: Option<String>,
    image_url: Option<String>,
    lookup_key: Option<String>,
    is_business: bool,
}

impl PhoneNumberInfo {
    /// Starts building an info record for an E.164 number.
    pub fn builder(normalized_number: impl Into<String>) -> PhoneNumberInfoBuilder {
        PhoneNumberInfoBuilder {
            info: Self {
                display_name: None,
                normalized_number: normalized_number.into(),
                number: None,
                phone_type: PhoneType::Unknown,
                phone_label: None,
                image_url: None,
                lookup_key: None,
                is_business: false,
            },
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn normalized_number(&self) -> &str {
        &self.normalized_number
    }

    /// The number as the directory presented it, if any.
    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    pub const fn phone_type(&self) -> PhoneType {
        self.phone_type
    }

    pub fn phone_label(&self) -> Option<&str> {
        self.phone_label.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    /// Opaque key joining this record to the contact cache.
    pub fn lookup_key(&self) -> Option<&str> {
        self.lookup_key.as_deref()
    }

    pub const fn is_business(&self) -> bool {
        self.is_business
    }

    /// Whether the record names someone. Nameless records are never cached.
    pub fn has_display_name(&self) -> bool {
        self.display_name.as_deref().is_some_and(|name| !name.is_empty())
    }
}

/// Builder for [`PhoneNumberInfo`].
#[derive(Clone, Debug)]
pub struct PhoneNumberInfoBuilder {
    info: PhoneNumberInfo,
}

impl PhoneNumberInfoBuilder {
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.info.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.info.number = Some(number.into());
        self
    }

    #[must_use]
    pub fn phone_type(mut self, phone_type: PhoneType) -> Self {
        self.info.phone_type = phone_type;
        self
    }

    #[must_use]
    pub fn phone_label(mut self, label: impl Into<String>) -> Self {
        self.info.phone_label = Some(label.into());
        self
    }

    #[must_use]
    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.info.image_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn lookup_key(mut self, key: impl Into<String>) -> Self {
        self.info.lookup_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn business(mut self, is_business: bool) -> Self {
        self.info.is_business = is_business;
        self
    }

    pub fn build(self) -> PhoneNumberInfo {
        self.info
    }
}

/// Where a cached contact came from.
///
/// `Profile` and `Business` records were confirmed by the remote directory and
/// are *full*. `Extended` records were derived locally and may lack a photo, so
/// they are re-resolved remotely on the next lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum SourceType {
    Profile,
    Business,
    Extended,
}

impl SourceType {
    /// Tag for a record returned by the remote directory.
    pub const fn from_business_flag(is_business: bool) -> Self {
        if is_business {
            Self::Business
        } else {
            Self::Profile
        }
    }

    pub const fn is_full(self) -> bool {
        matches!(self, Self::Profile | Self::Business)
    }

    pub const fn is_business(self) -> bool {
        matches!(self, Self::Business)
    }
}

/// Persisted contact entry keyed by normalized number.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CachedContactRecord {
    pub normalized_number: String,
    pub number: String,
    pub name: Option<String>,
    pub phone_type: PhoneType,
    pub label: Option<String>,
    pub photo_uri: Option<String>,
    pub lookup_key: Option<String>,
    pub source_type: SourceType,
}

impl CachedContactRecord {
    /// Builds the cache entry for a remote result.
    ///
    /// Returns `None` when the info has no display name. `formatted_number`
    /// stands in for the raw number when the directory did not supply one.
    pub fn from_info(info: &PhoneNumberInfo, formatted_number: &str) -> Option<Self> {
        if !info.has_display_name() {
            return None;
        }

        Some(Self {
            normalized_number: info.normalized_number.clone(),
            number: info
                .number
                .clone()
                .unwrap_or_else(|| formatted_number.to_owned()),
            name: info.display_name.clone(),
            phone_type: info.phone_type,
            label: info.phone_label.clone(),
            photo_uri: info.image_url.clone(),
            lookup_key: info.lookup_key.clone(),
            source_type: SourceType::from_business_flag(info.is_business),
        })
    }

    /// Projects the cached entry back into a [`PhoneNumberInfo`].
    ///
    /// Entries without a name carry no identity and project to `None`. The
    /// lookup key is not carried over.
    pub fn to_info(&self) -> Option<PhoneNumberInfo> {
        let name = self.name.as_deref().filter(|name| !name.is_empty())?;

        let mut builder = PhoneNumberInfo::builder(self.normalized_number.clone())
            .display_name(name)
            .number(self.number.clone())
            .phone_type(self.phone_type)
            .business(self.source_type.is_business());
        if let Some(label) = &self.label {
            builder = builder.phone_label(label.clone());
        }
        if let Some(uri) = &self.photo_uri {
            builder = builder.image_url(uri.clone());
        }
        Some(builder.build())
    }

    pub const fn is_full(&self) -> bool {
        self.source_type.is_full()
    }
}

/// Opaque data produced by a number lookup and handed back to the same
/// client when fetching the contact photo (session tokens, cookies, ...).
#[derive(Clone, Default)]
pub struct LookupContext(Option<Arc<dyn Any + Send + Sync>>);

impl LookupContext {
    pub const fn empty() -> Self {
        Self(None)
    }

    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref::<T>())
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for LookupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("LookupContext(empty)")
        } else {
            f.write_str("LookupContext(..)")
        }
    }
}

/// A positive answer from the remote directory.
#[derive(Clone, Debug)]
pub struct RemoteMatch {
    pub info: PhoneNumberInfo,
    pub context: LookupContext,
}

impl RemoteMatch {
    pub const fn new(info: PhoneNumberInfo, context: LookupContext) -> Self {
        Self { info, context }
    }
}

/// A decoded contact photo in row-major RGBA8.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> PhoneNumberInfo {
        PhoneNumberInfo::builder("+16502530000")
            .display_name("Alice")
            .phone_type(PhoneType::Mobile)
            .phone_label("cell")
            .image_url("https://example.com/a.jpg")
            .lookup_key("key-1")
            .build()
    }

    #[test]
    fn record_falls_back_to_formatted_number() {
        let record = CachedContactRecord::from_info(&alice(), "(650) 253-0000").unwrap();
        assert_eq!(record.number, "(650) 253-0000");
        assert_eq!(record.normalized_number, "+16502530000");
        assert_eq!(record.photo_uri.as_deref(), Some("https://example.com/a.jpg"));
        assert_eq!(record.lookup_key.as_deref(), Some("key-1"));
        assert_eq!(record.source_type, SourceType::Profile);
    }

    #[test]
    fn record_keeps_directory_number() {
        let info = PhoneNumberInfo::builder("+16502530000")
            .display_name("Pizza Place")
            .number("650-253-0000")
            .business(true)
            .build();
        let record = CachedContactRecord::from_info(&info, "(650) 253-0000").unwrap();
        assert_eq!(record.number, "650-253-0000");
        assert_eq!(record.source_type, SourceType::Business);
        assert!(record.is_full());
    }

    #[test]
    fn nameless_info_is_not_cacheable() {
        let info = PhoneNumberInfo::builder("+16502530000").build();
        assert!(CachedContactRecord::from_info(&info, "x").is_none());

        let blank = PhoneNumberInfo::builder("+16502530000").display_name("").build();
        assert!(CachedContactRecord::from_info(&blank, "x").is_none());
    }

    #[test]
    fn projection_drops_lookup_key_and_keeps_photo() {
        let record = CachedContactRecord::from_info(&alice(), "x").unwrap();
        let info = record.to_info().unwrap();
        assert_eq!(info.display_name(), Some("Alice"));
        assert_eq!(info.image_url(), Some("https://example.com/a.jpg"));
        assert_eq!(info.phone_label(), Some("cell"));
        assert_eq!(info.phone_type(), PhoneType::Mobile);
        assert_eq!(info.lookup_key(), None);
        assert!(!info.is_business());
    }

    #[test]
    fn extended_records_are_not_full() {
        assert!(SourceType::Profile.is_full());
        assert!(SourceType::Business.is_full());
        assert!(!SourceType::Extended.is_full());
        assert!(!SourceType::Extended.is_business());
    }

    #[test]
    fn lookup_context_round_trips_payload() {
        let context = LookupContext::new(String::from("token"));
        assert_eq!(context.downcast_ref::<String>().map(String::as_str), Some("token"));
        assert!(context.downcast_ref::<u32>().is_none());
        assert!(LookupContext::empty().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn record_serializes_with_snake_case_tags() {
        let record = CachedContactRecord::from_info(&alice(), "x").unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["source_type"], "profile");
        assert_eq!(json["phone_type"], "mobile");
    }
}
