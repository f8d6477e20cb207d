use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Listing-Atlas
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub site: SiteConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawl pacing and persistence tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Consecutive parse failures that trigger a cool-down
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    /// Length of the cool-down pause (seconds)
    #[serde(rename = "cooldown-secs")]
    pub cooldown_secs: u64,

    /// Bulk inserts are bisected while a batch holds at least this value squared
    #[serde(rename = "minimal-chunk-size")]
    pub minimal_chunk_size: usize,

    /// How block pages are resolved
    #[serde(rename = "block-resolver")]
    pub block_resolver: BlockResolverKind,

    /// Pause between re-fetches when the "wait" resolver is used (seconds)
    #[serde(rename = "block-wait-secs")]
    pub block_wait_secs: u64,
}

impl CrawlerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn block_wait(&self) -> Duration {
        Duration::from_secs(self.block_wait_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            cooldown_secs: 3600,
            minimal_chunk_size: 5,
            block_resolver: BlockResolverKind::Console,
            block_wait_secs: 60,
        }
    }
}

/// Strategy used when a fetched page is a block/challenge page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockResolverKind {
    /// Ask an operator to solve the challenge and press Enter
    Console,
    /// Sleep for `block-wait-secs` and fetch again
    Wait,
}

/// Description of the site being crawled
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Scheme and host that node ids are resolved against
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the list page enumerating the regions
    #[serde(rename = "root-path")]
    pub root_path: String,

    /// CSS selector of the list container; a page without it is unparseable
    #[serde(rename = "list-selector")]
    pub list_selector: String,

    /// CSS selector of the item links, matched inside the list container
    #[serde(rename = "item-selector")]
    pub item_selector: String,

    /// Markers whose presence identifies a block page
    #[serde(rename = "block-signatures", default = "default_block_signatures")]
    pub block_signatures: Vec<String>,

    /// Listing detail fields: name -> CSS selector
    #[serde(rename = "detail-fields", default)]
    pub detail_fields: BTreeMap<String, String>,
}

fn default_block_signatures() -> Vec<String> {
    vec!["www.google.com/recaptcha/api.js".to_string()]
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
