use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use reqwest::RequestBuilder;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

struct CancelRequest {
    label: String,
    request: RequestBuilder,
}

/// The server-side statement an HTTP executor is waiting on, together with
/// the request that cancels it.
///
/// A statement whose future is dropped before it finishes (a timeout, a
/// shutdown) is cancelled from a background task; `settle` waits for those.
#[derive(Clone, Default)]
pub(crate) struct InFlight {
    current: Arc<Mutex<Option<CancelRequest>>>,
    cancels: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl InFlight {
    /// Remembers how to cancel the statement now running, replacing any
    /// earlier cursor of the same statement.
    pub(crate) fn track(&self, label: impl Into<String>, request: RequestBuilder) {
        *self.current.lock() = Some(CancelRequest {
            label: label.into(),
            request,
        });
    }

    /// The statement reached a final state; nothing to cancel anymore.
    pub(crate) fn finish(&self) {
        self.current.lock().take();
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Cancels whatever is still tracked when the returned guard drops.
    pub(crate) fn guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            in_flight: self.clone(),
        }
    }

    fn cancel_in_background(&self) {
        let tracked = self.current.lock().take();
        let Some(tracked) = tracked else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                let handle = runtime.spawn(send_cancel(tracked));
                self.cancels.lock().push(handle);
            }
            Err(_) => warn!("no runtime left to cancel {}", tracked.label),
        }
    }

    /// Cancels a statement that is still tracked and waits for every cancel
    /// request issued so far.
    pub(crate) async fn settle(&self) {
        let tracked = self.current.lock().take();
        if let Some(tracked) = tracked {
            send_cancel(tracked).await;
        }
        let cancels = std::mem::take(&mut *self.cancels.lock());
        for handle in cancels {
            if let Err(e) = handle.await {
                warn!("cancel request task failed: {e}");
            }
        }
    }
}

pub(crate) struct CancelOnDrop {
    in_flight: InFlight,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.in_flight.cancel_in_background();
    }
}

async fn send_cancel(tracked: CancelRequest) {
    match tracked.request.send().await {
        Ok(resp) if resp.status().is_success() => debug!("cancelled {}", tracked.label),
        Ok(resp) => warn!("cancelling {}: HTTP {}", tracked.label, resp.status()),
        Err(e) => warn!("cancelling {}: {e}", tracked.label),
    }
}
