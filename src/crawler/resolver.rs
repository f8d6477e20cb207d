//! Block page resolution
//!
//! When the site serves a challenge page instead of content, the crawl waits
//! for a `BlockResolver` before fetching the same URL again.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

/// What to do after a block page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Fetch the page again
    Retry,
    /// Stop the crawl
    GiveUp,
}

/// Waits until a block page is believed cleared
#[async_trait]
pub trait BlockResolver: Send + Sync {
    async fn await_resolution(&self, url: &Url) -> Resolution;
}

/// Asks an operator on the terminal to solve the challenge
///
/// Closing stdin gives up.
#[derive(Debug, Default)]
pub struct ConsoleResolver;

#[async_trait]
impl BlockResolver for ConsoleResolver {
    async fn await_resolution(&self, url: &Url) -> Resolution {
        tracing::warn!("Block page at {}", url);
        eprintln!("Solve the challenge at {} in a browser, then press Enter", url);

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(0) => {
                tracing::warn!("Stdin closed while waiting on block page");
                Resolution::GiveUp
            }
            Ok(_) => Resolution::Retry,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                Resolution::GiveUp
            }
        }
    }
}

/// Sleeps for a fixed delay, then retries
#[derive(Debug, Clone)]
pub struct WaitResolver {
    wait: Duration,
}

impl WaitResolver {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

#[async_trait]
impl BlockResolver for WaitResolver {
    async fn await_resolution(&self, url: &Url) -> Resolution {
        tracing::warn!("Block page at {}, retrying in {:?}", url, self.wait);
        tokio::time::sleep(self.wait).await;
        Resolution::Retry
    }
}
