// 🌐 Portal session - the browser seam
//
// Discovery and retrieval only talk to `PortalSession`, so both can be driven
// by fixture markup in tests and by headless Chrome in production.

use anyhow::Result;
use std::time::Duration;

/// What discovery needs to know about a clickable element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub onclick: Option<String>,
    pub class: Option<String>,
}

/// One stateful browser session against the report portal.
///
/// All waits are bounded by the caller-supplied timeout.
pub trait PortalSession {
    fn navigate(&self, url: &str) -> Result<()>;

    /// Full rendered markup of the current page.
    fn page_source(&self) -> Result<String>;

    /// Elements matching `selector`, at most `limit` of them. No match is an empty list.
    fn candidates(&self, selector: &str, limit: usize) -> Result<Vec<Candidate>>;

    /// Programmatic click on the `index`-th match (bypasses overlays and visibility checks).
    fn click(&self, selector: &str, index: usize) -> Result<()>;

    /// Poll until `selector` matches or `timeout` elapses.
    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Outer markup of the first match, if any.
    fn outer_html(&self, selector: &str) -> Result<Option<String>>;

    /// Fixed settle interval for client-side rendering.
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ============================================================================
// HEADLESS CHROME
// ============================================================================

#[cfg(feature = "browser")]
pub use chrome::ChromeSession;

#[cfg(feature = "browser")]
mod chrome {
    use super::{Candidate, PortalSession};
    use anyhow::{anyhow, Context, Result};
    use headless_chrome::{Browser, LaunchOptions, Tab};
    use std::ffi::OsStr;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{debug, info};

    use crate::config::PortalConfig;

    /// A single Chrome process with one tab, reused for the whole run.
    ///
    /// Dropping it kills the browser, so the session is released on every exit path.
    pub struct ChromeSession {
        // Field order matters: the tab must go before its browser.
        tab: Arc<Tab>,
        _browser: Browser,
    }

    impl ChromeSession {
        pub fn launch(portal: &PortalConfig) -> Result<Self> {
            let options = LaunchOptions::default_builder()
                .headless(portal.headless)
                .sandbox(false)
                .window_size(Some((portal.window_width, portal.window_height)))
                .idle_browser_timeout(Duration::from_secs(600))
                .args(vec![
                    OsStr::new("--disable-dev-shm-usage"),
                    OsStr::new("--disable-gpu"),
                ])
                .build()
                .map_err(|e| anyhow!("invalid browser launch options: {}", e))?;

            let browser = Browser::new(options).context("failed to launch Chrome")?;
            let tab = browser.new_tab().context("failed to open browser tab")?;
            tab.set_user_agent(&portal.user_agent, None, None)
                .context("failed to set user agent")?;

            info!(headless = portal.headless, "browser session started");
            Ok(ChromeSession {
                tab,
                _browser: browser,
            })
        }
    }

    impl Drop for ChromeSession {
        fn drop(&mut self) {
            info!("browser session closed");
        }
    }

    impl PortalSession for ChromeSession {
        fn navigate(&self, url: &str) -> Result<()> {
            self.tab
                .navigate_to(url)
                .with_context(|| format!("navigation to {} failed", url))?
                .wait_until_navigated()
                .context("page load failed")?;
            Ok(())
        }

        fn page_source(&self) -> Result<String> {
            self.tab.get_content().context("failed to read page source")
        }

        fn candidates(&self, selector: &str, limit: usize) -> Result<Vec<Candidate>> {
            let elements = match self.tab.find_elements(selector) {
                Ok(elements) => elements,
                Err(e) => {
                    debug!(selector, error = %e, "no elements");
                    return Ok(Vec::new());
                }
            };

            let mut out = Vec::new();
            for element in elements.iter().take(limit) {
                out.push(Candidate {
                    text: element.get_inner_text().unwrap_or_default(),
                    onclick: element.get_attribute_value("onclick").unwrap_or(None),
                    class: element.get_attribute_value("class").unwrap_or(None),
                });
            }
            Ok(out)
        }

        fn click(&self, selector: &str, index: usize) -> Result<()> {
            let elements = self
                .tab
                .find_elements(selector)
                .with_context(|| format!("no element matches {}", selector))?;
            let element = elements
                .get(index)
                .ok_or_else(|| anyhow!("{} has no match at index {}", selector, index))?;
            element
                .call_js_fn("function() { this.click(); }", vec![], false)
                .with_context(|| format!("click on {} failed", selector))?;
            Ok(())
        }

        fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool> {
            Ok(self
                .tab
                .wait_for_element_with_custom_timeout(selector, timeout)
                .is_ok())
        }

        fn outer_html(&self, selector: &str) -> Result<Option<String>> {
            match self.tab.find_element(selector) {
                Ok(element) => Ok(Some(
                    element.get_content().context("failed to read element markup")?,
                )),
                Err(_) => Ok(None),
            }
        }
    }
}

// ============================================================================
// FIXTURE SESSION (tests)
// ============================================================================
