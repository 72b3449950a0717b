// src/heuristics/mod.rs

mod fields;
mod sections;

pub use sections::split_sections;

use serde::Serialize;

/// Separator used when several item numbers / quantities share one record.
pub const ITEM_SEPARATOR: &str = "&";

/// Purchase-order keys are compared on their trailing digits only.
const PO_KEY_LEN: usize = 12;

/// Everything we can pull out of one packing-list section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackingRecord {
    pub purchase_order: Option<String>,
    pub item_numbers: Vec<String>,
    pub quantities: Vec<String>,
    pub order_date: Option<String>,
    pub province: Option<String>,
    pub ship_to: Option<String>,
}

impl PackingRecord {
    /// How many of the six fields were filled.
    pub fn coverage(&self) -> (usize, usize) {
        let total = 6;
        let filled = [
            self.purchase_order.is_some(),
            !self.item_numbers.is_empty(),
            !self.quantities.is_empty(),
            self.order_date.is_some(),
            self.province.is_some(),
            self.ship_to.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, total)
    }

    pub fn item_number(&self) -> String {
        self.item_numbers.join(ITEM_SEPARATOR)
    }

    pub fn quantity(&self) -> String {
        self.quantities.join(ITEM_SEPARATOR)
    }

    /// Dedup key for this record, empty when no purchase order was found.
    pub fn normalized_po(&self) -> String {
        self.purchase_order
            .as_deref()
            .map(normalize_po)
            .unwrap_or_default()
    }
}

/// Strip leading zeros, then keep at most the trailing 12 characters.
pub fn normalize_po(raw: &str) -> String {
    let stripped = raw.trim_start_matches('0');
    let len = stripped.chars().count();
    stripped
        .chars()
        .skip(len.saturating_sub(PO_KEY_LEN))
        .collect()
}

/// Extract one record from a single section. Never fails; unmatched
/// fields are left empty.
pub fn extract_record(section: &str) -> PackingRecord {
    fields::extract(section)
}

/// Split document text and extract every non-blank section.
pub fn extract_document(text: &str) -> Vec<PackingRecord> {
    split_sections(text)
        .filter(|s| !s.trim().is_empty())
        .map(extract_record)
        .collect()
}
