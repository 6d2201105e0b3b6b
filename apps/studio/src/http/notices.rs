use tokio::sync::broadcast;
use tracing::error;

use crate::errors::ClientError;

const NOTICE_CAPACITY: usize = 64;

/// A user-visible error message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub message: String,
    pub detail: Option<String>,
}

/// Fan-out of request failures to whatever surface the front end renders.
#[derive(Clone)]
pub struct Notices {
    tx: broadcast::Sender<Notice>,
}

impl Notices {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(NOTICE_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn publish(&self, notice: Notice) {
        // No subscribers is fine: the log line below still records it.
        let _ = self.tx.send(notice);
    }

    pub fn report(&self, err: &ClientError) {
        error!("{}: {err}", err.headline());
        self.publish(Notice {
            message: err.headline().to_string(),
            detail: Some(err.to_string()),
        });
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}
