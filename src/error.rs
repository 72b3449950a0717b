//! Error types for the harvesting pipeline.

use thiserror::Error;

/// Failures listing or fetching packing-slip documents.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Not a PDF: {0}")]
    NotPdf(String),

    #[error("invalid document URL {url}: {reason}")]
    BadUrl { url: String, reason: String },

    #[error("session cookie is not a valid header value")]
    BadCookie,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures turning PDF bytes into page text.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Every page looks like an image; there is no text layer to read.
    #[error("PDF is scanned / image-only")]
    Scanned,

    #[error("PDF has no extractable text")]
    NoText,
}

/// Failures talking to the spreadsheet store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected response: {0}")]
    Payload(String),
}

/// Run-fatal errors. Everything else is logged and skipped.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("failed to list documents: {0}")]
    Listing(#[source] SourceError),

    #[error("failed to fetch existing PO list: {0}")]
    KnownPurchaseOrders(#[source] StoreError),
}
