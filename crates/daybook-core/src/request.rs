//! Request lifecycle management.
//!
//! Every API call goes through [`RequestManager::fetch`], which tracks at most
//! one in-flight request per URL, bounds each request with a timeout and
//! lets the session abort everything on teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{CancelCause, Error, Result};
use crate::transport::{ApiRequest, ApiResponse, Transport};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

struct InFlight {
    id: u64,
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
}

impl InFlight {
    fn cancel(&self, cause: CancelCause) {
        // first cause wins; a timed-out request stays a timeout
        let _ = self.cause.set(cause);
        self.token.cancel();
    }
}

type InFlightMap = Mutex<HashMap<String, InFlight>>;

pub struct RequestManager {
    transport: Arc<dyn Transport>,
    in_flight: Arc<InFlightMap>,
    next_id: AtomicU64,
    default_timeout: Duration,
}

impl RequestManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_timeout(transport, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(transport: Arc<dyn Transport>, default_timeout: Duration) -> Self {
        Self {
            transport,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            default_timeout,
        }
    }

    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Issue `request`, superseding any in-flight request to the same URL.
    ///
    /// Fails with [`Error::Cancelled`] when the request times out, is
    /// superseded or is aborted by [`Self::abort_all`]. Non-success statuses
    /// are returned as responses.
    pub async fn fetch(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = request.path.clone();
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let cause = Arc::new(OnceLock::new());

        {
            let mut tracked = lock(&self.in_flight);
            let previous = tracked.insert(
                url.clone(),
                InFlight {
                    id,
                    token: token.clone(),
                    cause: cause.clone(),
                },
            );
            if let Some(previous) = previous {
                tracing::debug!(url, "Superseding in-flight request");
                previous.cancel(CancelCause::Superseded);
            }
        }
        let _release = Release {
            map: self.in_flight.clone(),
            url: url.clone(),
            id,
        };

        let method = request.method.as_str();
        tokio::select! {
            biased;
            () = token.cancelled() => {
                let cause = cause.get().copied().unwrap_or(CancelCause::Shutdown);
                tracing::debug!(method, url, %cause, "Request cancelled");
                Err(Error::Cancelled(cause))
            }
            () = tokio::time::sleep(timeout) => {
                let _ = cause.set(CancelCause::Timeout);
                tracing::warn!(method, url, timeout_ms = timeout.as_millis(), "Request timed out");
                Err(Error::Cancelled(CancelCause::Timeout))
            }
            result = self.transport.send(request) => result,
        }
    }

    /// Cancel every outstanding request and forget all handles.
    pub fn abort_all(&self) {
        let drained: Vec<InFlight> = lock(&self.in_flight).drain().map(|(_, entry)| entry).collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Aborting in-flight requests");
        }
        for entry in drained {
            entry.cancel(CancelCause::Shutdown);
        }
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

/// Removes the handle when the fetch future completes or is dropped, unless a
/// newer request for the same URL replaced it.
struct Release {
    map: Arc<InFlightMap>,
    url: String,
    id: u64,
}

impl Drop for Release {
    fn drop(&mut self) {
        let mut tracked = lock(&self.map);
        if tracked.get(&self.url).is_some_and(|entry| entry.id == self.id) {
            tracked.remove(&self.url);
        }
    }
}

fn lock(map: &InFlightMap) -> MutexGuard<'_, HashMap<String, InFlight>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
