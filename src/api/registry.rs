//! Outstanding request registry.
//!
//! Maps tags to the completion of the request that carries them. Tags are
//! allocated and entries inserted under one lock, so a response can never
//! arrive for a tag the registry does not know yet. Completions always run
//! after the lock is released.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::api::error::{ApiError, ApiResult};

/// The completion of one in-flight request
pub(crate) struct PendingRequest {
    complete: Box<dyn FnOnce(ApiResult<Value>) + Send>,
}

impl PendingRequest {
    pub(crate) fn new(complete: impl FnOnce(ApiResult<Value>) + Send + 'static) -> Self {
        Self {
            complete: Box::new(complete),
        }
    }

    fn complete(self, result: ApiResult<Value>) {
        (self.complete)(result)
    }
}

struct Inner {
    last_tag: u32,
    pending: HashMap<u32, PendingRequest>,
    accepting: bool,
}

impl Inner {
    /// Next tag after `last_tag`, skipping 0 and tags still in use.
    fn next_tag(&mut self) -> u32 {
        loop {
            self.last_tag = self.last_tag.wrapping_add(1);
            if self.last_tag != 0 && !self.pending.contains_key(&self.last_tag) {
                return self.last_tag;
            }
        }
    }
}

/// Tag → pending request map shared by request issuers and the dispatcher
pub(crate) struct RequestRegistry {
    inner: Mutex<Inner>,
}

impl RequestRegistry {
    /// A closed registry; [`open`](Self::open) it when a session starts.
    pub(crate) fn new() -> Self {
        Self::starting_after(0)
    }

    fn starting_after(last_tag: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                last_tag,
                pending: HashMap::new(),
                accepting: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start accepting registrations.
    pub(crate) fn open(&self) {
        self.lock().accepting = true;
    }

    /// Allocate a tag and store the request under it.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotConnected`] once the registry has been failed.
    pub(crate) fn register(&self, request: PendingRequest) -> ApiResult<u32> {
        let mut inner = self.lock();
        if !inner.accepting {
            return Err(ApiError::NotConnected);
        }
        let tag = inner.next_tag();
        inner.pending.insert(tag, request);
        Ok(tag)
    }

    /// Complete and remove the request with `tag`. Returns `false` if there was none.
    pub(crate) fn complete(&self, tag: u32, result: ApiResult<Value>) -> bool {
        let request = self.lock().pending.remove(&tag);
        match request {
            Some(request) => {
                request.complete(result);
                true
            }
            None => false,
        }
    }

    /// Remove a request without completing it.
    pub(crate) fn cancel(&self, tag: u32) -> bool {
        self.lock().pending.remove(&tag).is_some()
    }

    /// Stop accepting registrations and fail everything outstanding with `error`.
    ///
    /// Returns the number of requests failed.
    pub(crate) fn fail_all(&self, error: &ApiError) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut inner = self.lock();
            inner.accepting = false;
            inner.pending.drain().map(|(_, request)| request).collect()
        };
        let count = drained.len();
        for request in drained {
            request.complete(Err(error.clone()));
        }
        count
    }
}

/// The eventual result of one request
///
/// Resolves exactly once: with the server's response, or with the error
/// that ended the connection. Dropping it does not cancel the request.
#[derive(Debug)]
pub struct ResponseHandle<T> {
    tag: u32,
    rx: oneshot::Receiver<ApiResult<T>>,
}

impl<T> ResponseHandle<T> {
    pub(crate) fn new(tag: u32, rx: oneshot::Receiver<ApiResult<T>>) -> Self {
        Self { tag, rx }
    }

    /// Tag the request was sent with.
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Wait for the result.
    pub async fn wait(self) -> ApiResult<T> {
        self.rx.await.unwrap_or_else(|_| Err(ApiError::Disconnected))
    }

    /// Wait for the result for at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Timeout`] if nothing arrived in time. The request stays
    /// outstanding on the server.
    pub async fn wait_timeout(self, timeout: Duration) -> ApiResult<T> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .unwrap_or_else(|_| Err(ApiError::Timeout))
    }
}

#[cfg(test)]
impl RequestRegistry {
    /// An open registry whose next tag is `last_tag + 1`.
    pub(crate) fn open_after(last_tag: u32) -> Self {
        let registry = Self::starting_after(last_tag);
        registry.open();
        registry
    }

    /// Number of outstanding requests.
    pub(crate) fn len(&self) -> usize {
        self.lock().pending.len()
    }
}
