//! Link identifiers and extracted records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stand-in for a missing organization name
pub const ORGANIZATION_NAME_UNAVAILABLE: &str = "Organization name unavailable";

/// Stand-in for an empty person name cell
pub const PERSON_NAME_UNAVAILABLE: &str = "Name unavailable";

/// Stand-in for an empty person role cell
pub const PERSON_ROLE_UNAVAILABLE: &str = "Role unavailable";

/// Identifies one detail page; the entity code taken from a listing row.
///
/// Stable across runs, so it doubles as the resume key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One organization + person pairing pulled from a detail page.
///
/// Every record produced from the same page carries identical organization
/// fields and team count; only the person fields vary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub organization_name: String,
    pub organization_email: Option<String>,
    pub organization_phone: Option<String>,
    pub organization_province: Option<String>,
    pub person_name: String,
    pub person_role: String,
    pub team_count: u32,
}
