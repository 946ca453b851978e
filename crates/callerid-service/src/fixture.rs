//! File-backed capabilities for the `callerid-lookup` binary.
//!
//! [`FixtureDirectory`] answers reverse lookups from a JSON file:
//!
//! ```json
//! {
//!   "entries": [
//!     { "number": "+15551234", "name": "Alice", "image_url": "https://img.example/alice.png" }
//!   ],
//!   "images": { "https://img.example/alice.png": "photos/alice.png" }
//! }
//! ```
//!
//! Image paths are relative to the JSON file. [`FsContentResolver`] maps
//! `content://<authority>/<path>` onto `<root>/<authority>/<path>`.

use anyhow::Context;
use bytes::Bytes;
use callerid_service::callerid_core::{
    ContentResolver, LookupContext, LookupError, PhoneNumberInfo, PhoneType, RemoteLookupClient,
    RemoteMatch,
};
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};
use url::Url;

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    entries: Vec<DirectoryEntry>,
    #[serde(default)]
    images: HashMap<String, PathBuf>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    number: String,
    name: Option<String>,
    #[serde(default)]
    phone_type: PhoneType,
    label: Option<String>,
    image_url: Option<String>,
    lookup_key: Option<String>,
    #[serde(default)]
    business: bool,
}

impl DirectoryEntry {
    fn to_info(&self) -> PhoneNumberInfo {
        let mut builder = PhoneNumberInfo::builder(self.number.clone())
            .phone_type(self.phone_type)
            .business(self.business);
        if let Some(name) = &self.name {
            builder = builder.display_name(name.clone());
        }
        if let Some(label) = &self.label {
            builder = builder.phone_label(label.clone());
        }
        if let Some(url) = &self.image_url {
            builder = builder.image_url(url.clone());
        }
        if let Some(key) = &self.lookup_key {
            builder = builder.lookup_key(key.clone());
        }
        builder.build()
    }
}

/// Session handed from a number lookup to the matching image lookup.
#[derive(Debug)]
struct Session {
    number: String,
}

/// [`RemoteLookupClient`] backed by a JSON file.
#[derive(Debug)]
pub struct FixtureDirectory {
    entries: HashMap<String, DirectoryEntry>,
    images: HashMap<String, PathBuf>,
}

impl FixtureDirectory {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read directory {}", path.display()))?;
        let file: DirectoryFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse directory {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let images = file
            .images
            .into_iter()
            .map(|(url, image)| (url, base.join(image)))
            .collect();
        let entries = file
            .entries
            .into_iter()
            .map(|entry| (entry.number.clone(), entry))
            .collect();

        Ok(Self { entries, images })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl RemoteLookupClient for FixtureDirectory {
    fn lookup_number<'a>(
        &'a self,
        normalized_number: &'a str,
        formatted_number: &'a str,
        is_incoming: bool,
    ) -> BoxFuture<'a, Result<Option<RemoteMatch>, LookupError>> {
        async move {
            tracing::debug!(formatted_number, is_incoming, "Directory lookup");
            Ok(self.entries.get(normalized_number).map(|entry| {
                let session = Session {
                    number: normalized_number.to_owned(),
                };
                RemoteMatch::new(entry.to_info(), LookupContext::new(session))
            }))
        }
        .boxed()
    }

    fn lookup_image<'a>(
        &'a self,
        url: &'a str,
        context: &'a LookupContext,
    ) -> BoxFuture<'a, Result<Bytes, LookupError>> {
        async move {
            let session = context.downcast_ref::<Session>().map(|s| s.number.as_str());
            tracing::debug!(?session, url, "Directory image lookup");

            let path = self
                .images
                .get(url)
                .cloned()
                .ok_or_else(|| LookupError::Remote {
                    reason: format!("no image registered for {url}"),
                })?;

            let bytes = tokio::task::spawn_blocking(move || std::fs::read(path))
                .await
                .map_err(|e| LookupError::Transport {
                    reason: e.to_string(),
                })?
                .map_err(|e| LookupError::Transport {
                    reason: e.to_string(),
                })?;
            Ok(Bytes::from(bytes))
        }
        .boxed()
    }
}

/// [`ContentResolver`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsContentResolver {
    root: PathBuf,
}

impl FsContentResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps a URI onto a path under the root. Parent-directory segments are
    /// rejected.
    fn resolve(&self, uri: &str) -> Option<PathBuf> {
        let url = Url::parse(uri).ok()?;
        let mut path = self.root.join(url.host_str()?);

        for segment in url.path_segments()? {
            match segment {
                "" | "." => {}
                ".." => return None,
                segment => path.push(segment),
            }
        }
        Some(path)
    }
}

impl ContentResolver for FsContentResolver {
    fn open(&self, uri: &str) -> io::Result<Option<Box<dyn Read + Send>>> {
        let Some(path) = self.resolve(uri) else {
            return Ok(None);
        };

        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
