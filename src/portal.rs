use crate::config::PortalConfig;
use crate::error::SourceError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info};

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("anchor pattern is valid")
});

/// One packing-slip document, addressed by URL or file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub location: String,
}

/// Lists packing-slip documents and fetches their bytes.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn list(&self) -> Result<Vec<DocumentRef>, SourceError>;
    async fn fetch(&self, doc: &DocumentRef) -> Result<Vec<u8>, SourceError>;
}

/// The vendor portal: a listing page of download links behind a session cookie.
pub struct PortalSource {
    client: Client,
    listing_url: Url,
    link_marker: String,
    exclude_marker: String,
}

impl PortalSource {
    pub fn new(cfg: &PortalConfig) -> Result<Self, SourceError> {
        let listing_url = Url::parse(&cfg.listing_url).map_err(|e| SourceError::BadUrl {
            url: cfg.listing_url.clone(),
            reason: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        if let Some(cookie) = &cfg.cookie {
            let value = HeaderValue::from_str(cookie).map_err(|_| SourceError::BadCookie)?;
            headers.insert(COOKIE, value);
        }
        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            listing_url,
            link_marker: cfg.link_marker.clone(),
            exclude_marker: cfg.exclude_marker.clone(),
        })
    }
}

#[async_trait]
impl DocumentSource for PortalSource {
    async fn list(&self) -> Result<Vec<DocumentRef>, SourceError> {
        info!(url = %self.listing_url, "Fetching listing page");
        let resp = self.client.get(self.listing_url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }
        let html = resp.text().await?;

        let links = extract_links(
            &html,
            &self.listing_url,
            &self.link_marker,
            &self.exclude_marker,
        );
        info!(matches = links.len(), "Download links found");
        Ok(links
            .into_iter()
            .map(|location| DocumentRef { location })
            .collect())
    }

    async fn fetch(&self, doc: &DocumentRef) -> Result<Vec<u8>, SourceError> {
        let resp = self.client.get(&doc.location).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("application/pdf") {
            return Err(SourceError::NotPdf(content_type));
        }

        let bytes = resp.bytes().await?;
        debug!(bytes = bytes.len(), "Fetched PDF");
        Ok(bytes.to_vec())
    }
}

/// Absolute download links in page order, duplicates dropped.
pub fn extract_links(html: &str, base: &Url, marker: &str, exclude: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for cap in ANCHOR_HREF.captures_iter(html) {
        let href = cap[1].replace("&amp;", "&");
        let Ok(url) = base.join(&href) else {
            continue;
        };
        let url = url.to_string();
        if url.contains(marker) && !url.contains(exclude) && !links.contains(&url) {
            links.push(url);
        }
    }
    links
}

/// PDFs in a local directory, in file-name order.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn list(&self) -> Result<Vec<DocumentRef>, SourceError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_pdf = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if is_pdf && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        info!(dir = %self.root.display(), matches = paths.len(), "PDF files found");

        Ok(paths
            .into_iter()
            .map(|p| DocumentRef {
                location: p.display().to_string(),
            })
            .collect())
    }

    async fn fetch(&self, doc: &DocumentRef) -> Result<Vec<u8>, SourceError> {
        Ok(tokio::fs::read(&doc.location).await?)
    }
}
