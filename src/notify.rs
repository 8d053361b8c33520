use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use crate::pipe::open_nonblocking_writer;
use crate::protocol::Notification;
use crate::Result;

/// Delivers change notifications to subscriber endpoints.
///
/// Delivery is best-effort and fire-and-forget: an endpoint that cannot be opened or written is
/// logged and skipped. The dispatcher never retries and never removes subscribers, that is the
/// job of an explicit unsubscribe or disconnect.
///
/// The subscriber list handed to [`Dispatcher::notify`] is the copy taken under the exclusive
/// lock by [`KvsEngine::write_tracked`], so the pipe I/O happens with no table lock held.
///
/// [`KvsEngine::write_tracked`]: ./trait.KvsEngine.html#tymethod.write_tracked
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    /// creates a dispatcher
    pub fn new() -> Self {
        Dispatcher
    }

    /// sends `(key, value)` to every endpoint in `subscribers`.
    ///
    /// Returns the number of endpoints the notification was delivered to.
    ///
    /// # Errors
    /// only fails if the notification itself cannot be encoded (oversize key or value)
    pub fn notify(&self, key: &str, value: &str, subscribers: &[String]) -> Result<usize> {
        if subscribers.is_empty() {
            return Ok(0);
        }
        let frame = Notification::new(key, value).encode()?;

        let delivered = subscribers
            .iter()
            .filter(|endpoint| deliver(Path::new(endpoint), &frame))
            .count();
        debug!(key, delivered, total = subscribers.len(), "dispatched notification");
        Ok(delivered)
    }
}

fn deliver(endpoint: &Path, frame: &[u8]) -> bool {
    let result = open_nonblocking_writer(endpoint).and_then(|mut pipe| pipe.write_all(frame));
    if let Err(e) = result {
        warn!("could not notify {:?}: {}", endpoint, e);
        return false;
    }
    true
}
