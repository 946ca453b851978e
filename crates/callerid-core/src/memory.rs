use crate::{
    error::CacheError,
    model::{CachedContactRecord, SourceType},
    ports::CacheStore,
};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// URI prefix under which [`InMemoryCacheStore`] exposes cached photos.
pub const CACHE_PHOTO_URI_PREFIX: &str = "content://callerid.cache/photo/";

/// A process-local [`CacheStore`].
///
/// Contacts and photos live in two maps behind `parking_lot` read-write locks.
/// Storing a photo for a known contact rewrites the contact's `photo_uri` to
/// point back into the cache, the same way a persistent store would.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    contacts: RwLock<HashMap<String, CachedContactRecord>>,
    photos: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache URI a photo for `normalized_number` is served from.
    pub fn photo_uri(normalized_number: &str) -> String {
        format!("{CACHE_PHOTO_URI_PREFIX}{normalized_number}")
    }

    pub fn photo(&self, normalized_number: &str) -> Option<Bytes> {
        self.photos.read().get(normalized_number).cloned()
    }

    /// Seeds a locally derived record that will be re-resolved remotely.
    pub fn insert_extended(&self, mut record: CachedContactRecord) {
        record.source_type = SourceType::Extended;
        self.contacts
            .write()
            .insert(record.normalized_number.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, normalized_number: &str) -> Result<Option<CachedContactRecord>, CacheError> {
        Ok(self.contacts.read().get(normalized_number).cloned())
    }

    fn put(&self, record: CachedContactRecord) -> Result<(), CacheError> {
        if record.normalized_number.is_empty() {
            return Err(CacheError::WriteRejected {
                number: record.number,
                reason: "missing normalized number".into(),
            });
        }
        self.contacts
            .write()
            .insert(record.normalized_number.clone(), record);
        Ok(())
    }

    fn add_photo(&self, normalized_number: &str, photo: &[u8]) -> Result<(), CacheError> {
        self.photos
            .write()
            .insert(normalized_number.to_owned(), Bytes::copy_from_slice(photo));

        if let Some(record) = self.contacts.write().get_mut(normalized_number) {
            record.photo_uri = Some(Self::photo_uri(normalized_number));
        }
        Ok(())
    }

    fn is_cache_uri(&self, uri: &str) -> bool {
        uri.starts_with(CACHE_PHOTO_URI_PREFIX)
    }
}
