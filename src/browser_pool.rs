//! Scoped headless Chrome instances.
//!
//! A Chrome process is expensive and a search session owns its page for the
//! whole run, so browsers are handed out behind a counting semaphore. The
//! returned [`BrowserGuard`] kills the process and releases the permit when
//! dropped, on success, failure or panic alike.
//!
//! Uses std::sync primitives so it works inside spawn_blocking closures.

use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use headless_chrome::{Browser, LaunchOptions};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::config::BrowserConfig;

/// Maximum concurrent headless Chrome instances.
const MAX_BROWSER_INSTANCES: usize = 1;

static BROWSER_SEMAPHORE: Lazy<BrowserSemaphore> = Lazy::new(|| BrowserSemaphore::new(MAX_BROWSER_INSTANCES));

struct BrowserSemaphore {
    state: Mutex<usize>,
    condvar: Condvar,
    max: usize,
}

impl BrowserSemaphore {
    fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(0),
            condvar: Condvar::new(),
            max,
        }
    }

    /// Acquire a permit, blocking until one is available.
    fn acquire(&self) -> BrowserPermit<'_> {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while *count >= self.max {
            count = self.condvar.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        *count += 1;
        BrowserPermit { semaphore: self }
    }

    fn release(&self) {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        self.condvar.notify_all();
    }

    /// Block until no permits are held or `timeout` passes. Returns whether
    /// every permit was released.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (count, _) = self
            .condvar
            .wait_timeout_while(count, timeout, |in_use| *in_use > 0)
            .unwrap_or_else(|e| e.into_inner());
        *count == 0
    }

    fn in_use(&self) -> usize {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct BrowserPermit<'a> {
    semaphore: &'a BrowserSemaphore,
}

impl Drop for BrowserPermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// A Chrome browser with its semaphore permit. Field order matters: the
/// browser is dropped (process killed) before the permit is released.
pub struct BrowserGuard {
    pub browser: Browser,
    _permit: BrowserPermit<'static>,
}

/// Number of browser permits currently held.
pub fn browsers_in_use() -> usize {
    BROWSER_SEMAPHORE.in_use()
}

/// Wait up to `timeout` for every browser to be shut down and released.
pub fn wait_for_release(timeout: Duration) -> bool {
    BROWSER_SEMAPHORE.wait_idle(timeout)
}

/// Whether Chrome must run without its sandbox (container detected via
/// `/.dockerenv` or the `MAPLEADS_CONTAINER` env var).
pub fn is_container() -> bool {
    std::env::var("MAPLEADS_CONTAINER").is_ok() || Path::new("/.dockerenv").exists()
}

/// Chrome binary override from `CHROME_PATH`, if set.
pub fn chrome_path() -> Option<PathBuf> {
    std::env::var("CHROME_PATH").ok().filter(|p| !p.is_empty()).map(PathBuf::from)
}

/// Launch a Chrome instance, blocking until a permit is available.
pub fn create_browser(config: &BrowserConfig) -> anyhow::Result<BrowserGuard> {
    let permit = BROWSER_SEMAPHORE.acquire();

    let sandbox = !is_container();
    let path = chrome_path();
    debug!(
        "Launching Chrome (headless: {}, sandbox: {}, path: {:?})",
        config.headless, sandbox, path
    );

    let options = LaunchOptions::default_builder()
        .headless(config.headless)
        .sandbox(sandbox)
        .path(path)
        .window_size(Some((config.window_width, config.window_height)))
        .idle_browser_timeout(Duration::from_secs(config.idle_timeout_secs))
        .build()
        .map_err(|e| anyhow!("Failed to build Chrome launch options: {}", e))?;

    let browser = Browser::new(options).map_err(|e| anyhow!("Failed to launch headless Chrome: {}", e))?;

    Ok(BrowserGuard {
        browser,
        _permit: permit,
    })
}
