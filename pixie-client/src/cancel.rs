//! First-error-wins cooperative cancellation shared by the stream
//! demultiplexer and the callback-driver tasks of one run.
//!
//! A callback failing has to stop the stream reader before it feeds any
//! other table's callbacks another row; the reader only naturally stops on
//! its own errors, so callback tasks need a way to reach back into it.

use std::sync::Arc;

use parking_lot::Mutex;
use pixie_errors::ApiError;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct Cancel {
    error: Arc<Mutex<Option<ApiError>>>,
    notify: Arc<Notify>,
}

impl Cancel {
    pub fn new() -> Cancel {
        Cancel {
            error: Arc::new(Mutex::new(None)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Records `err` as the run's terminal outcome if none has been
    /// recorded yet, and wakes any task waiting in [`Cancel::cancelled`].
    pub fn signal(&self, err: ApiError) {
        let mut guard = self.error.lock();
        if guard.is_none() {
            *guard = Some(err);
            drop(guard);
            self.notify.notify_waiters();
        }
    }

    pub fn error(&self) -> Option<ApiError> {
        self.error.lock().clone()
    }

    /// Resolves once [`Cancel::signal`] has been called, yielding the
    /// recorded error.
    pub async fn cancelled(&self) -> ApiError {
        loop {
            let notified = self.notify.notified();
            if let Some(err) = self.error() {
                return err;
            }
            notified.await;
        }
    }
}

impl Default for Cancel {
    fn default() -> Self {
        Cancel::new()
    }
}
