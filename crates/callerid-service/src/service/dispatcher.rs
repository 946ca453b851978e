//! Single-consumer delivery of lookup results to listeners.
//!
//! Workers never call listeners directly. They post a [`Completion`] to the
//! [`ResultDispatcher`], and one [`DispatchLoop`] drains the channel and
//! invokes the listeners one at a time, in the order completions were posted.
//! Hosts that need callbacks on a particular task or thread can build the pair
//! with [`ResultDispatcher::channel`] and drive the loop themselves.

use callerid_core::{
    DecodedImage, Error, ImageLookupListener, NumberLookupListener, PhoneNumberInfo,
};
use core::time::Duration;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};

/// A result waiting to be handed to its listener.
pub enum Completion {
    NumberInfo {
        listener: Arc<dyn NumberLookupListener>,
        info: Option<PhoneNumberInfo>,
    },
    Image {
        listener: Arc<dyn ImageLookupListener>,
        image: Option<DecodedImage>,
    },
    /// Sent last during shutdown; acknowledged once everything before it was
    /// delivered.
    Shutdown { response: oneshot::Sender<()> },
}

/// Producer half: cheap to clone, shared by all workers.
#[derive(Clone)]
pub struct ResultDispatcher {
    tx: mpsc::UnboundedSender<Completion>,
}

/// Consumer half: invokes listeners serially.
pub struct DispatchLoop {
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl ResultDispatcher {
    /// Creates a dispatcher and the loop that must be run for deliveries to
    /// happen.
    pub fn channel() -> (Self, DispatchLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DispatchLoop { rx })
    }

    /// Creates a dispatcher whose loop runs as a task on the current Tokio
    /// runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn() -> Self {
        let (dispatcher, dispatch_loop) = Self::channel();
        tokio::spawn(dispatch_loop.run());
        dispatcher
    }

    pub fn deliver_info(
        &self,
        listener: Arc<dyn NumberLookupListener>,
        info: Option<PhoneNumberInfo>,
    ) -> Result<(), Error> {
        self.post(Completion::NumberInfo { listener, info })
    }

    pub fn deliver_image(
        &self,
        listener: Arc<dyn ImageLookupListener>,
        image: Option<DecodedImage>,
    ) -> Result<(), Error> {
        self.post(Completion::Image { listener, image })
    }

    fn post(&self, completion: Completion) -> Result<(), Error> {
        self.tx.send(completion).map_err(|_| Error::ChannelError {
            context: "result dispatcher closed".to_string(),
        })
    }

    /// Waits until every completion posted so far has been delivered, then
    /// stops the loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if the loop is already gone.
    pub async fn shutdown(&self, wait: Duration) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.post(Completion::Shutdown { response: tx })?;

        match timeout(wait, rx).await {
            Ok(Ok(())) => tracing::debug!("Result dispatcher drained"),
            Ok(Err(e)) => tracing::error!("Result dispatcher returned error: {e}"),
            Err(_) => tracing::warn!("Result dispatcher shutdown timed out"),
        }
        Ok(())
    }
}

impl DispatchLoop {
    /// Delivers completions until shutdown is requested or every
    /// [`ResultDispatcher`] is dropped.
    ///
    /// A listener that panics is logged; the loop keeps going.
    pub async fn run(mut self) {
        while let Some(completion) = self.rx.recv().await {
            match completion {
                Completion::NumberInfo { listener, info } => {
                    let delivered = catch_unwind(AssertUnwindSafe(|| {
                        listener.on_phone_number_info_complete(info);
                    }));
                    if delivered.is_err() {
                        tracing::error!("Number lookup listener panicked");
                    }
                }
                Completion::Image { listener, image } => {
                    let delivered = catch_unwind(AssertUnwindSafe(|| {
                        listener.on_image_fetch_complete(image);
                    }));
                    if delivered.is_err() {
                        tracing::error!("Image lookup listener panicked");
                    }
                }
                Completion::Shutdown { response } => {
                    if response.send(()).is_err() {
                        tracing::error!("Failed to acknowledge dispatcher shutdown");
                    }
                    break;
                }
            }
        }
        tracing::trace!("Dispatch loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn delivers_in_posting_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (dispatcher, dispatch_loop) = ResultDispatcher::channel();
        let task = tokio::spawn(dispatch_loop.run());

        for name in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            let info = PhoneNumberInfo::builder("+15551234").display_name(name).build();
            dispatcher
                .deliver_info(
                    Arc::new(move |info: Option<PhoneNumberInfo>| {
                        let name = info
                            .and_then(|i| i.display_name().map(str::to_owned))
                            .unwrap_or_default();
                        seen.lock().push(name);
                    }),
                    Some(info),
                )
                .unwrap();
        }
        dispatcher.shutdown(Duration::from_secs(1)).await.unwrap();
        task.await.unwrap();

        assert_eq!(*seen.lock(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_stop_delivery() {
        let images = Arc::new(Mutex::new(0usize));
        let dispatcher = ResultDispatcher::spawn();

        dispatcher
            .deliver_info(
                Arc::new(|info: Option<PhoneNumberInfo>| {
                    if info.is_none() {
                        panic!("listener failure");
                    }
                }),
                None,
            )
            .unwrap();
        let counter = Arc::clone(&images);
        dispatcher
            .deliver_image(
                Arc::new(move |image: Option<DecodedImage>| {
                    assert!(image.is_none());
                    *counter.lock() += 1;
                }),
                None,
            )
            .unwrap();
        dispatcher.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(*images.lock(), 1);
    }

    #[tokio::test]
    async fn posting_after_shutdown_fails() {
        let dispatcher = ResultDispatcher::spawn();
        dispatcher.shutdown(Duration::from_secs(1)).await.unwrap();
        tokio::task::yield_now().await;

        let result = dispatcher.deliver_info(Arc::new(|_: Option<PhoneNumberInfo>| {}), None);
        assert!(matches!(result, Err(Error::ChannelError { .. })));
    }
}
