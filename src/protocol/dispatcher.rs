use crate::error::{constants, ProtocolError, Result};
use crate::protocol::endpoint::Endpoint;
use crate::protocol::message::Payload;
use crate::transport::PeerId;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Hooks an endpoint invokes on every installed listener, in install order.
///
/// All hooks default to no-ops. Returned errors are logged by the endpoint and
/// do not stop delivery to later listeners.
pub trait Listener: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn on_install(&self, _endpoint: &Endpoint) -> Result<()> {
        Ok(())
    }

    fn on_uninstall(&self, _endpoint: &Endpoint) -> Result<()> {
        Ok(())
    }

    fn on_packet(&self, _endpoint: &Endpoint, _packet: &Payload, _from: PeerId) -> Result<()> {
        Ok(())
    }

    /// Must not block. Called whether or not any peer is connected.
    fn on_tick(&self, _endpoint: &Endpoint, _delta: Duration, _tick: u64) -> Result<()> {
        Ok(())
    }

    fn on_connect(&self, _endpoint: &Endpoint, _peer: PeerId) -> Result<()> {
        Ok(())
    }

    fn on_disconnect(&self, _endpoint: &Endpoint, _peer: PeerId) -> Result<()> {
        Ok(())
    }
}

/// Ordered listener list.
///
/// Hooks are invoked on a snapshot taken under the read lock, so a listener may
/// install or uninstall listeners from inside a hook.
pub struct Dispatcher {
    listeners: Arc<RwLock<Vec<Arc<dyn Listener>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn install(&self, listener: Arc<dyn Listener>) -> Result<()> {
        let mut listeners = self
            .listeners
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LISTENERS_LOCK))?;

        listeners.push(listener);
        Ok(())
    }

    /// Remove `listener` by identity. Returns whether it was installed.
    pub fn uninstall(&self, listener: &Arc<dyn Listener>) -> Result<bool> {
        let mut listeners = self
            .listeners
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LISTENERS_LOCK))?;

        let before = listeners.len();
        listeners.retain(|installed| !Arc::ptr_eq(installed, listener));
        Ok(listeners.len() != before)
    }

    pub fn snapshot(&self) -> Result<Vec<Arc<dyn Listener>>> {
        let listeners = self
            .listeners
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LISTENERS_LOCK))?;

        Ok(listeners.clone())
    }

    pub fn len(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
