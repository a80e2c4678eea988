//! Statistics reporter — read-only view of the bridge counters.

use tokio::sync::watch;

use chirpbridge_domain::statistics::Statistics;

/// Cloneable handle reading the statistics published by a
/// [`Bridge`](crate::bridge::Bridge).
///
/// The bridge is the single writer; any number of reporters may read
/// concurrently with message handling.
#[derive(Debug, Clone)]
pub struct StatisticsReporter {
    receiver: watch::Receiver<Statistics>,
}

impl StatisticsReporter {
    pub(crate) fn new(receiver: watch::Receiver<Statistics>) -> Self {
        Self { receiver }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Statistics {
        self.receiver.borrow().clone()
    }

    /// Wait until the statistics change. Returns `false` once the bridge is
    /// gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}
