use crate::config::types::{
    Config, ExtractorConfig, OutputConfig, SessionConfig, StorageBackend, TargetConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Placeholder substituted with the entity code in `detail-path`
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target_config(&config.target)?;
    validate_session_config(&config.session)?;
    validate_extractor_config(&config.extractor)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.listing_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid listing-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "listing-url '{}' must use http or https",
            config.listing_url
        )));
    }

    if !config.detail_path.contains(CODE_PLACEHOLDER) {
        return Err(ConfigError::Validation(format!(
            "detail-path must contain the {} placeholder, got '{}'",
            CODE_PLACEHOLDER, config.detail_path
        )));
    }

    validate_selector(&config.row_selector)?;
    validate_selector(&config.code_selector)?;

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.login_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "login-marker cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 || config.timeout_secs > 600 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be between 1 and 600, got {}",
            config.timeout_secs
        )));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max-redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_extractor_config(config: &ExtractorConfig) -> Result<(), ConfigError> {
    for (name, label) in [
        ("email-label", &config.email_label),
        ("phone-label", &config.phone_label),
        ("province-label", &config.province_label),
    ] {
        if label.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    validate_selector(&config.name_selector)?;
    validate_selector(&config.info_selector)?;
    validate_selector(&config.teams_selector)?;
    validate_selector(&config.people_selector)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    match config.backend {
        StorageBackend::Files => {
            if config.progress_path.is_empty() {
                return Err(ConfigError::Validation(
                    "progress-path cannot be empty".to_string(),
                ));
            }

            if config.output_path.is_empty() {
                return Err(ConfigError::Validation(
                    "output-path cannot be empty".to_string(),
                ));
            }

            if config.progress_path == config.output_path {
                return Err(ConfigError::Validation(
                    "progress-path and output-path must differ".to_string(),
                ));
            }
        }
        StorageBackend::Sqlite => {
            if config.database_path.is_empty() {
                return Err(ConfigError::Validation(
                    "database-path cannot be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    parse_selector(selector).map(|_| ())
}

/// Parses a CSS selector, reporting failures as configuration errors
pub(crate) fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}
