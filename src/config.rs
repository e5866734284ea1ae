use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "scraper";
const ENV_PREFIX: &str = "SCRAPER";
const PAGE_PLACEHOLDER: &str = "{page}";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: String,
    /// Directory listing URL with a `{page}` placeholder.
    pub directory_url: String,
    pub wiki_base_url: String,
    pub wiki_list_url: String,
    pub user_agent: String,
    pub delay_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_pages: Option<usize>,
}

impl Settings {
    /// Defaults, then `scraper.toml` if present, then `SCRAPER_*` env vars.
    pub fn load() -> Result<Settings> {
        defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("failed to load settings")?
            .try_deserialize()
            .context("invalid settings")
    }

    pub fn directory_page_url(&self, page: usize) -> String {
        self.directory_url.replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>> {
    let builder = Config::builder()
        .set_default("db_path", "data/companies.sqlite")?
        .set_default(
            "directory_url",
            "https://topstartups.io/?page={page}&hq_location=San+Francisco+Bay+Area",
        )?
        .set_default("wiki_base_url", "https://en.wikipedia.org")?
        .set_default(
            "wiki_list_url",
            "https://en.wikipedia.org/wiki/List_of_companies_based_in_the_San_Francisco_Bay_Area",
        )?
        .set_default("user_agent", "BayAreaCompanyScraper/1.0 (Research Project)")?
        .set_default("delay_ms", 1000_i64)?
        .set_default("max_retries", 3_i64)?
        .set_default("backoff_ms", 2000_i64)?
        .set_default("concurrency", 2_i64)?
        .set_default("timeout_secs", 30_i64)?;
    Ok(builder)
}
