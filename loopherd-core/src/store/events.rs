use std::time::Duration;

use crate::error::Result;
use crate::store::KeyEvent;

/// Pollable view of the store's change-notification feed.
#[allow(async_fn_in_trait)]
pub trait EventSource: Send {
    /// Wait up to `wait` for the next key mutation; `Ok(None)` means
    /// nothing was ready within the window.
    async fn next_event(&mut self, wait: Duration) -> Result<Option<KeyEvent>>;
}
