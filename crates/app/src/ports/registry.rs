//! Device registry port — the network server that knows which devices exist.

use std::future::Future;
use std::sync::Arc;

use chirpbridge_domain::device::DeviceRecord;
use chirpbridge_domain::error::BridgeError;

/// Source of the devices (and their entity schemas) to publish.
///
/// Implementations skip devices whose schema cannot be extracted; only
/// connectivity or authorisation failures are reported as errors.
pub trait DeviceRegistry: Send + Sync {
    /// Fetch the current, enabled devices of the configured application.
    fn current_devices(&self)
    -> impl Future<Output = Result<Vec<DeviceRecord>, BridgeError>> + Send;
}

impl<T: DeviceRegistry> DeviceRegistry for Arc<T> {
    fn current_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<DeviceRecord>, BridgeError>> + Send {
        (**self).current_devices()
    }
}
