use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};
use toml_edit::{DocumentMut, value};

pub const DEFAULT_CONFIG_PATH: &str = ".config/packslip.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Where packing slips come from.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Portal(PortalConfig),
    Directory { path: PathBuf },
}

#[derive(Debug, Deserialize)]
pub struct PortalConfig {
    /// Page listing the download links.
    pub listing_url: String,
    /// Raw `Cookie` header value of a logged-in portal session.
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default = "default_link_marker")]
    pub link_marker: String,
    #[serde(default = "default_exclude_marker")]
    pub exclude_marker: String,
}

fn default_link_marker() -> String {
    "downloadFile.do?fileId=".to_string()
}

fn default_exclude_marker() -> String {
    "authorize".to_string()
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Apps Script web app URL (the `/exec` endpoint).
    pub script_url: String,
}

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_submit_delay_ms")]
    pub submit_delay_ms: u64,
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            submit_delay_ms: default_submit_delay_ms(),
            journal_path: None,
        }
    }
}

impl RunConfig {
    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }
}

fn default_max_records() -> usize {
    300
}

fn default_submit_delay_ms() -> u64 {
    1000
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Replace the portal session cookie, leaving the rest of the file as is.
    pub fn update_cookie(
        path: impl AsRef<Path>,
        cookie: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = fs::read_to_string(&path)?;
        let mut doc = content.parse::<DocumentMut>()?;

        doc["source"]["cookie"] = value(cookie);

        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}
