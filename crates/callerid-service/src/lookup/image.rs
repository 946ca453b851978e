//! Contact photo retrieval.
//!
//! The URL scheme decides where the bytes come from:
//!
//! - `http`/`https`: downloaded through the [`RemoteLookupClient`] with the
//!   [`LookupContext`] of the number lookup that produced the URL.
//! - `content`/`android.resource`: read through the [`ContentResolver`] in
//!   fixed-size chunks on the blocking thread pool.
//! - anything else is rejected.
//!
//! Fetched bytes are stored in the cache unless they were read back out of
//! the cache itself. Decoding happens last, also on the blocking pool. The
//! image listener is notified exactly once per fetch, with `None` on any
//! failure.

use super::request::ImageFetchRequest;
use crate::{
    pool::worker::JobHandler,
    service::dispatcher::ResultDispatcher,
    telemetry::{increment_image_failures, increment_images_fetched},
};
use bytes::{Bytes, BytesMut};
use callerid_core::{
    CacheStore, ContentResolver, DecodedImage, ImageDecoder, ImageError, LookupContext,
    RemoteLookupClient,
};
use std::{
    future::Future,
    io::{self, Read},
    sync::Arc,
};
use url::Url;

/// URI schemes served by the [`ContentResolver`].
const LOCAL_SCHEMES: &[&str] = &["content", "android.resource", "android-resource"];

/// Raw photo bytes and whether they came from the network.
#[derive(Debug)]
struct Fetched {
    bytes: Bytes,
    remote: bool,
}

/// Executes [`ImageFetchRequest`]s on the image pool.
pub struct ImageFetcher {
    remote: Arc<dyn RemoteLookupClient>,
    cache: Arc<dyn CacheStore>,
    content: Arc<dyn ContentResolver>,
    decoder: Arc<dyn ImageDecoder>,
    read_chunk: usize,
    results: ResultDispatcher,
}

impl ImageFetcher {
    pub fn new(
        remote: Arc<dyn RemoteLookupClient>,
        cache: Arc<dyn CacheStore>,
        content: Arc<dyn ContentResolver>,
        decoder: Arc<dyn ImageDecoder>,
        read_chunk: usize,
        results: ResultDispatcher,
    ) -> Self {
        Self {
            remote,
            cache,
            content,
            decoder,
            read_chunk,
            results,
        }
    }

    /// Fetches, caches and decodes the photo for one request.
    #[tracing::instrument(skip_all, fields(number = %request.normalized_number, url = %request.url))]
    pub async fn fetch(&self, request: &ImageFetchRequest) -> Result<DecodedImage, ImageError> {
        let fetched = self.fetch_bytes(&request.url, &request.context).await?;

        if fetched.remote || !self.cache.is_cache_uri(&request.url) {
            if let Err(e) = self
                .cache
                .add_photo(&request.normalized_number, &fetched.bytes)
            {
                tracing::warn!("Failed to cache photo: {e}");
            }
        }

        let decoder = Arc::clone(&self.decoder);
        let bytes = fetched.bytes;
        tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| ImageError::Io(io::Error::other(e)))?
    }

    async fn fetch_bytes(&self, raw: &str, context: &LookupContext) -> Result<Fetched, ImageError> {
        let url = Url::parse(raw).map_err(|e| ImageError::InvalidUrl {
            url: raw.to_owned(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {
                let bytes = self.remote.lookup_image(raw, context).await?;
                Ok(Fetched {
                    bytes,
                    remote: true,
                })
            }
            scheme if LOCAL_SCHEMES.contains(&scheme) => {
                let content = Arc::clone(&self.content);
                let uri = raw.to_owned();
                let chunk = self.read_chunk;
                let bytes =
                    tokio::task::spawn_blocking(move || read_content(content.as_ref(), &uri, chunk))
                        .await
                        .map_err(|e| ImageError::Io(io::Error::other(e)))??;
                Ok(Fetched {
                    bytes,
                    remote: false,
                })
            }
            scheme => Err(ImageError::UnsupportedScheme {
                scheme: scheme.to_owned(),
            }),
        }
    }
}

impl JobHandler<ImageFetchRequest> for ImageFetcher {
    fn handle(
        &self,
        _worker_id: usize,
        request: ImageFetchRequest,
    ) -> impl Future<Output = ()> + Send {
        async move {
            let image = match self.fetch(&request).await {
                Ok(image) => {
                    increment_images_fetched();
                    Some(image)
                }
                Err(e) => {
                    increment_image_failures();
                    tracing::error!(number = %request.normalized_number, "Image fetch failed: {e}");
                    None
                }
            };

            if let Err(e) = self.results.deliver_image(request.listener, image) {
                tracing::warn!("Dropping image result: {e}");
            }
        }
    }
}

/// Reads everything behind `uri`, `chunk` bytes at a time.
fn read_content(
    resolver: &dyn ContentResolver,
    uri: &str,
    chunk: usize,
) -> Result<Bytes, ImageError> {
    let Some(mut reader) = resolver.open(uri)? else {
        return Err(ImageError::NoContent { uri: uri.to_owned() });
    };

    let mut buf = vec![0u8; chunk.max(1)];
    let mut out = BytesMut::new();
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    if out.is_empty() {
        return Err(ImageError::NoContent { uri: uri.to_owned() });
    }
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use callerid_core::{
        CACHE_PHOTO_URI_PREFIX, InMemoryCacheStore, LookupError, RasterDecoder, RemoteMatch,
    };
    use futures::future::{BoxFuture, FutureExt};
    use image::{ImageFormat, Rgba, RgbaImage};
    use portable_atomic::{AtomicUsize, Ordering};
    use std::{collections::HashMap, io::Cursor};

    fn png() -> Vec<u8> {
        let mut png = Vec::new();
        RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        png
    }

    #[derive(Default)]
    struct Photos {
        bytes: Vec<u8>,
        downloads: AtomicUsize,
    }

    impl RemoteLookupClient for Photos {
        fn lookup_number<'a>(
            &'a self,
            _normalized_number: &'a str,
            _formatted_number: &'a str,
            _is_incoming: bool,
        ) -> BoxFuture<'a, Result<Option<RemoteMatch>, LookupError>> {
            async { Ok(None) }.boxed()
        }

        fn lookup_image<'a>(
            &'a self,
            _url: &'a str,
            _context: &'a LookupContext,
        ) -> BoxFuture<'a, Result<Bytes, LookupError>> {
            self.downloads.fetch_add(1, Ordering::AcqRel);
            let bytes = Bytes::from(self.bytes.clone());
            async move { Ok(bytes) }.boxed()
        }
    }

    /// Serves fixed byte strings keyed by URI, `tiny` bytes per read.
    struct MapResolver {
        files: HashMap<String, Vec<u8>>,
        tiny: usize,
    }

    struct Trickle {
        data: Cursor<Vec<u8>>,
        tiny: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.tiny);
            self.data.read(&mut buf[..n])
        }
    }

    impl ContentResolver for MapResolver {
        fn open(&self, uri: &str) -> io::Result<Option<Box<dyn Read + Send>>> {
            Ok(self.files.get(uri).map(|data| {
                Box::new(Trickle {
                    data: Cursor::new(data.clone()),
                    tiny: self.tiny,
                }) as Box<dyn Read + Send>
            }))
        }
    }

    struct Harness {
        fetcher: ImageFetcher,
        cache: Arc<InMemoryCacheStore>,
        remote: Arc<Photos>,
    }

    fn harness(files: HashMap<String, Vec<u8>>) -> Harness {
        let cache = Arc::new(InMemoryCacheStore::new());
        let remote = Arc::new(Photos {
            bytes: png(),
            ..Photos::default()
        });
        let (results, _loop) = ResultDispatcher::channel();
        let fetcher = ImageFetcher::new(
            Arc::clone(&remote) as Arc<dyn RemoteLookupClient>,
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            Arc::new(MapResolver { files, tiny: 3 }),
            Arc::new(RasterDecoder),
            16_384,
            results,
        );
        Harness {
            fetcher,
            cache,
            remote,
        }
    }

    fn request(url: &str) -> ImageFetchRequest {
        ImageFetchRequest {
            normalized_number: "+15551234".into(),
            url: url.into(),
            context: LookupContext::empty(),
            listener: Arc::new(|_: Option<DecodedImage>| {}),
        }
    }

    #[tokio::test]
    async fn https_downloads_and_caches() {
        let h = harness(HashMap::new());

        let image = h
            .fetcher
            .fetch(&request("https://example.com/a.png"))
            .await
            .unwrap();

        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(h.remote.downloads.load(Ordering::Acquire), 1);
        assert_eq!(h.cache.photo("+15551234").unwrap().as_ref(), png().as_slice());
    }

    #[tokio::test]
    async fn cache_uri_is_not_written_back() {
        let uri = format!("{CACHE_PHOTO_URI_PREFIX}+15551234");
        let h = harness(HashMap::from([(uri.clone(), png())]));

        h.fetcher.fetch(&request(&uri)).await.unwrap();

        assert!(h.cache.photo("+15551234").is_none());
        assert_eq!(h.remote.downloads.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn foreign_content_uri_is_cached() {
        let uri = "content://contacts/photo/7";
        let h = harness(HashMap::from([(uri.to_owned(), png())]));

        h.fetcher.fetch(&request(uri)).await.unwrap();

        assert!(h.cache.photo("+15551234").is_some());
    }

    #[tokio::test]
    async fn unsupported_scheme_touches_nothing() {
        let h = harness(HashMap::new());

        let err = h
            .fetcher
            .fetch(&request("ftp://example.com/a.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ImageError::UnsupportedScheme { ref scheme } if scheme == "ftp"));
        assert_eq!(err.to_string(), "ftp scheme not supported for image lookups");
        assert!(h.cache.photo("+15551234").is_none());
        assert_eq!(h.remote.downloads.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let h = harness(HashMap::new());

        let err = h
            .fetcher
            .fetch(&request("android.resource://pkg/drawable/1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ImageError::NoContent { .. }));
    }

    #[test]
    fn reads_content_in_chunks() {
        let data: Vec<u8> = (0..=255).collect();
        let resolver = MapResolver {
            files: HashMap::from([("content://x/y".to_owned(), data.clone())]),
            tiny: 7,
        };

        let bytes = read_content(&resolver, "content://x/y", 16).unwrap();
        assert_eq!(bytes.as_ref(), data.as_slice());
    }
}
