//! Link discovery
//!
//! Turns a loaded listing page into the ordered sequence of detail page
//! identifiers. Rows without a code are skipped; duplicates are kept, the
//! progress set takes care of them.

use crate::config::{parse_selector, TargetConfig};
use crate::crawler::record::LinkId;
use crate::crawler::transport::LoadedPage;
use crate::ConfigError;
use scraper::{Html, Selector};

/// Scans listing rows for entity codes
#[derive(Debug, Clone)]
pub struct LinkDiscovery {
    rows: Selector,
    code: Selector,
}

impl LinkDiscovery {
    pub fn new(config: &TargetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            rows: parse_selector(&config.row_selector)?,
            code: parse_selector(&config.code_selector)?,
        })
    }

    /// Returns the codes found on the listing page, top to bottom
    pub fn discover(&self, page: &LoadedPage) -> Vec<LinkId> {
        self.discover_document(&page.document())
    }

    pub fn discover_html(&self, html: &str) -> Vec<LinkId> {
        self.discover_document(&Html::parse_document(html))
    }

    fn discover_document(&self, document: &Html) -> Vec<LinkId> {
        document
            .select(&self.rows)
            .filter_map(|row| row.select(&self.code).next())
            .map(|cell| cell.text().collect::<String>())
            .filter_map(|text| {
                let code = text.trim();
                (!code.is_empty()).then(|| LinkId::new(code))
            })
            .collect()
    }
}
