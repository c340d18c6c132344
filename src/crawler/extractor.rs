//! Entity extractor
//!
//! Pulls organization fields once per detail page, then emits one record per
//! row of the people table. Missing text never fails extraction; it falls
//! back to a fixed stand-in or to `None`.

use crate::config::{parse_selector, ExtractorConfig};
use crate::crawler::record::{
    Record, ORGANIZATION_NAME_UNAVAILABLE, PERSON_NAME_UNAVAILABLE, PERSON_ROLE_UNAVAILABLE,
};
use crate::crawler::transport::LoadedPage;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};

/// Organization-level fields shared by every record of a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Organization {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    province: Option<String>,
    team_count: u32,
}

/// Turns a loaded detail page into records
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    name: Selector,
    info: Selector,
    label_marker: Selector,
    teams: Selector,
    people: Selector,
    first_cell: Selector,
    second_cell: Selector,
    email_label: String,
    phone_label: String,
    province_label: String,
}

impl EntityExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            name: parse_selector(&config.name_selector)?,
            info: parse_selector(&config.info_selector)?,
            label_marker: parse_selector("strong")?,
            teams: parse_selector(&config.teams_selector)?,
            people: parse_selector(&config.people_selector)?,
            first_cell: parse_selector("td:nth-child(1)")?,
            second_cell: parse_selector("td:nth-child(2)")?,
            email_label: config.email_label.clone(),
            phone_label: config.phone_label.clone(),
            province_label: config.province_label.clone(),
        })
    }

    /// Extracts every record on the page
    ///
    /// A page with organization data but no people rows yields no records.
    pub fn extract(&self, page: &LoadedPage) -> Vec<Record> {
        self.extract_document(&page.document())
    }

    pub fn extract_html(&self, html: &str) -> Vec<Record> {
        self.extract_document(&Html::parse_document(html))
    }

    fn extract_document(&self, document: &Html) -> Vec<Record> {
        let organization = self.organization(document);

        document
            .select(&self.people)
            .skip(1) // header row
            .map(|row| Record {
                organization_name: organization
                    .name
                    .clone()
                    .unwrap_or_else(|| ORGANIZATION_NAME_UNAVAILABLE.to_string()),
                organization_email: organization.email.clone(),
                organization_phone: organization.phone.clone(),
                organization_province: organization.province.clone(),
                person_name: cell_text(&row, &self.first_cell)
                    .unwrap_or_else(|| PERSON_NAME_UNAVAILABLE.to_string()),
                person_role: cell_text(&row, &self.second_cell)
                    .unwrap_or_else(|| PERSON_ROLE_UNAVAILABLE.to_string()),
                team_count: organization.team_count,
            })
            .collect()
    }

    fn organization(&self, document: &Html) -> Organization {
        let mut organization = Organization {
            name: document
                .select(&self.name)
                .next()
                .and_then(|element| non_empty(element_text(&element))),
            team_count: document.select(&self.teams).count() as u32,
            ..Organization::default()
        };

        // Only blocks with a bold label count; later ones override earlier ones
        for block in document
            .select(&self.info)
            .filter(|block| block.select(&self.label_marker).next().is_some())
        {
            let text = element_text(&block);
            if let Some(value) = labeled_value(&text, &self.email_label) {
                organization.email = Some(value);
            }
            if let Some(value) = labeled_value(&text, &self.phone_label) {
                organization.phone = Some(value);
            }
            if let Some(value) = labeled_value(&text, &self.province_label) {
                organization.province = Some(value);
            }
        }

        organization
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn cell_text(row: &ElementRef<'_>, cell: &Selector) -> Option<String> {
    row.select(cell).next().and_then(|c| non_empty(element_text(&c)))
}

/// Returns the text following `label` in a block, or None if the label is absent
fn labeled_value(text: &str, label: &str) -> Option<String> {
    if !text.contains(label) {
        return None;
    }
    non_empty(text.replacen(label, "", 1))
}
