use serde::Deserialize;

/// Main configuration structure for Directory-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the crawl starts and how detail pages are addressed
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Listing page containing one row per entity
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Detail page path and query, with a `{code}` placeholder.
    /// Resolved against the listing URL's origin.
    #[serde(rename = "detail-path", default = "default_detail_path")]
    pub detail_path: String,

    /// Selector for listing rows
    #[serde(rename = "row-selector", default = "default_row_selector")]
    pub row_selector: String,

    /// Selector, relative to a row, for the cell holding the entity code
    #[serde(rename = "code-selector", default = "default_code_selector")]
    pub code_selector: String,
}

/// Navigation behavior shared by every fetch
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Substring identifying an authentication page in a URL (case-insensitive)
    #[serde(rename = "login-marker", default = "default_login_marker")]
    pub login_marker: String,

    /// Per-fetch timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of non-fatal redirect hops followed per navigation
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Treat every 301/302 as the login gate, not only those whose target
    /// carries the login marker
    #[serde(rename = "strict-redirects", default = "default_strict_redirects")]
    pub strict_redirects: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_marker: default_login_marker(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            strict_redirects: default_strict_redirects(),
        }
    }
}

/// Labels and selectors used to pull fields out of a detail page
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    #[serde(rename = "email-label", default = "default_email_label")]
    pub email_label: String,

    #[serde(rename = "phone-label", default = "default_phone_label")]
    pub phone_label: String,

    #[serde(rename = "province-label", default = "default_province_label")]
    pub province_label: String,

    /// Element holding the organization name
    #[serde(rename = "name-selector", default = "default_name_selector")]
    pub name_selector: String,

    /// Labeled text blocks ("Email: ...", "Province: ...")
    ///
    /// Only matches holding a `<strong>` label are read, which stands in for
    /// `h5:has(strong)` since scraper 0.18 has no `:has`.
    #[serde(rename = "info-selector", default = "default_info_selector")]
    pub info_selector: String,

    /// Rows of the teams table; their count becomes the team count
    #[serde(rename = "teams-selector", default = "default_teams_selector")]
    pub teams_selector: String,

    /// Rows of the people table, header row included
    #[serde(rename = "people-selector", default = "default_people_selector")]
    pub people_selector: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            email_label: default_email_label(),
            phone_label: default_phone_label(),
            province_label: default_province_label(),
            name_selector: default_name_selector(),
            info_selector: default_info_selector(),
            teams_selector: default_teams_selector(),
            people_selector: default_people_selector(),
        }
    }
}

/// Which persistence backend holds progress and records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON progress document plus a JSON Lines output file
    #[default]
    Files,
    /// Single SQLite database
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the progress document (files backend)
    #[serde(rename = "progress-path", default = "default_progress_path")]
    pub progress_path: String,

    /// Path to the JSON Lines record file (files backend)
    #[serde(rename = "output-path", default = "default_output_path")]
    pub output_path: String,

    /// Path to the SQLite database file (sqlite backend)
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            progress_path: default_progress_path(),
            output_path: default_output_path(),
            database_path: default_database_path(),
        }
    }
}

fn default_detail_path() -> String {
    "/pnfg/NPcd/NFG_VerClub?cod_primaria=1000118&codigo_club={code}".to_string()
}

fn default_row_selector() -> String {
    "table tr".to_string()
}

fn default_code_selector() -> String {
    "td:nth-child(2)".to_string()
}

fn default_login_marker() -> String {
    "login".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> u32 {
    10
}

fn default_user_agent() -> String {
    format!("directory-harvester/{}", env!("CARGO_PKG_VERSION"))
}

fn default_strict_redirects() -> bool {
    true
}

fn default_email_label() -> String {
    "Email:".to_string()
}

fn default_phone_label() -> String {
    "Teléfonos:".to_string()
}

fn default_province_label() -> String {
    "Provincia:".to_string()
}

fn default_name_selector() -> String {
    "h2".to_string()
}

fn default_info_selector() -> String {
    "h5".to_string()
}

fn default_teams_selector() -> String {
    "table.table-striped:first-child > tbody > tr".to_string()
}

fn default_people_selector() -> String {
    "table.table-striped:last-child tr".to_string()
}

fn default_progress_path() -> String {
    "./progress.json".to_string()
}

fn default_output_path() -> String {
    "./clubs.jsonl".to_string()
}

fn default_database_path() -> String {
    "./harvest.db".to_string()
}
