//! Browser automation seam
//!
//! The orchestrator and step executor only talk to the browser through
//! [`BrowserDriver`]. Every call may suspend and may fail; a failure becomes
//! the failure of whichever test is currently running.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::E2eResult;

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate the page to `url` (absolute, or relative to the base URL).
    async fn goto(&self, url: &str) -> E2eResult<()>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    /// Type `text` into the element matching `selector`.
    async fn type_text(&self, selector: &str, text: &str) -> E2eResult<()>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()>;

    /// Inner text of the first element matching `selector`.
    async fn inner_text(&self, selector: &str) -> E2eResult<String>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> E2eResult<()>;

    /// Read a JSON-serializable global out of the running page.
    ///
    /// Returns `None` when the global is undefined or null.
    async fn read_global(&self, name: &str) -> E2eResult<Option<serde_json::Value>>;

    /// Release the browser session.
    async fn close(&self) -> E2eResult<()> {
        Ok(())
    }
}
