use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::metadata::{ExifField, FieldKey, IptcField, XmpField};

/// Top-level configuration for the metadata service.
///
/// Holds the brand profile overlaid onto every generated field set, the AI
/// service chain, timeouts for the two external calls, and session limits.
///
/// # Loading
///
/// ```rust,no_run
/// use groundswell_meta::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.ai_services.anthropic.api_key = "sk-ant-...".into();
/// config.session_ttl_seconds = 600;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Organization defaults written into every field set.
    pub brand_profile: BrandProfile,
    /// Upper bound on one description chain call.
    pub ai_timeout_seconds: u64,
    /// Upper bound on one metadata write.
    pub sink_timeout_seconds: u64,
    /// Sessions expire this many seconds after upload.
    pub session_ttl_seconds: u64,
    /// Maximum number of live sessions; the oldest is evicted beyond this.
    pub max_sessions: usize,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// AI service configurations (Anthropic, OpenAI, Gemini).
    pub ai_services: AiServices,
    /// Order in which AI services are tried (failover chain).
    pub service_order: Vec<String>,
    pub server: ServerConfig,
}

/// Placeholder in [`BrandProfile::copyright`] for the creation year.
pub const YEAR_PLACEHOLDER: &str = "{year}";

/// Fixed organizational branding.
///
/// Loaded once at startup and never mutated; the field mapper overwrites
/// the branding keys of every field set from these values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrandProfile {
    pub organization: String,
    /// Written to EXIF Artist, IPTC By-line and XMP Creator.
    pub creator: String,
    /// Copyright line. `{year}` is replaced with the image's creation year.
    pub copyright: String,
    pub credit: String,
    pub source: String,
    pub website: String,
    pub phone: String,
    pub category: String,
    pub supplemental_categories: Vec<String>,
    /// Background about the organization handed to the vision model.
    pub prompt_context: String,
}

/// Configuration for all available AI services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiServices {
    pub anthropic: ServiceConfig,
    pub openai: ServiceConfig,
    pub gemini: ServiceConfig,
}

/// API key, model and switch for a single vision service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub api_key: String,
    pub model: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

const DEFAULT_PROMPT_CONTEXT: &str = "\
GroundSwell is a Business Ownership Platform company.

GroundSwell focuses on:
- Organizational Alpha (combined incremental returns and decreased risks)
- Fractal Flywheel of Organizational Development
- Fractal Flywheel of Management & Leadership Development
- Changing Pains (growing pains when an organization's systems don't support its size)
- Stages of Organizational Development
- Business Ownership School
- Inner Optimization
- Pyramid of Tech Stack Development
- Direct Ownership

Key people: Bob Bennett, Cody Marshall

Common keywords include: equity partners, strategic partners, return on investment, business building partner, \
investment partner, Groundswell, organizational strategies, business growth, risk management, performance enhancement, \
business efficiency, strategic management, value creation, operational efficiency, fractal flywheel, flywheel, \
business improvement, business advice, business partner, business valuation, private equity";

impl Default for BrandProfile {
    fn default() -> Self {
        Self {
            organization: "GroundSwell".to_string(),
            creator: "GroundSwell".to_string(),
            copyright: format!("Copyright {YEAR_PLACEHOLDER} GroundSwell"),
            credit: "GroundSwell".to_string(),
            source: "GroundSwell".to_string(),
            website: "www.groundswell.co".to_string(),
            phone: "435-214-2997".to_string(),
            category: "Business Ownership Platform".to_string(),
            supplemental_categories: vec![
                "Direct Ownership".to_string(),
                "Organizational Development".to_string(),
                "Management & Leadership Development".to_string(),
            ],
            prompt_context: DEFAULT_PROMPT_CONTEXT.to_string(),
        }
    }
}

impl BrandProfile {
    /// The copyright line for an image created in `year`.
    ///
    /// Without a year the `{year}` placeholder is dropped along with one
    /// neighbouring space.
    ///
    /// ```rust
    /// use groundswell_meta::config::BrandProfile;
    ///
    /// let brand = BrandProfile::default();
    /// assert_eq!(brand.copyright_notice(Some("2025")), "Copyright 2025 GroundSwell");
    /// assert_eq!(brand.copyright_notice(None), "Copyright GroundSwell");
    /// ```
    pub fn copyright_notice(&self, year: Option<&str>) -> String {
        match year {
            Some(year) => self.copyright.replace(YEAR_PLACEHOLDER, year),
            None => self
                .copyright
                .replace(&format!(" {YEAR_PLACEHOLDER}"), "")
                .replace(&format!("{YEAR_PLACEHOLDER} "), "")
                .replace(YEAR_PLACEHOLDER, ""),
        }
    }
}

impl Default for AiServices {
    fn default() -> Self {
        Self {
            anthropic: ServiceConfig {
                api_key: String::new(),
                model: "claude-sonnet-4-20250514".to_string(),
                enabled: true,
            },
            openai: ServiceConfig {
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                enabled: false,
            },
            gemini: ServiceConfig {
                api_key: String::new(),
                model: "gemini-2.0-flash".to_string(),
                enabled: false,
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brand_profile: BrandProfile::default(),
            ai_timeout_seconds: 60,
            sink_timeout_seconds: 30,
            session_ttl_seconds: 30 * 60,
            max_sessions: 256,
            max_upload_bytes: 20 * 1024 * 1024,
            ai_services: AiServices::default(),
            service_order: vec![
                "anthropic".to_string(),
                "openai".to_string(),
                "gemini".to_string(),
            ],
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the config file path: `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Fill empty API keys from `ANTHROPIC_API_KEY`, `OPENAI_API_KEY` and
    /// `GEMINI_API_KEY`.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let services = [
            ("ANTHROPIC_API_KEY", &mut self.ai_services.anthropic),
            ("OPENAI_API_KEY", &mut self.ai_services.openai),
            ("GEMINI_API_KEY", &mut self.ai_services.gemini),
        ];
        for (var, service) in services {
            if !service.api_key.is_empty() {
                continue;
            }
            if let Some(key) = lookup(var).filter(|k| !k.trim().is_empty()) {
                log::debug!("Using {var} from environment");
                service.api_key = key.trim().to_string();
            }
        }
    }

    /// Reject settings the service cannot honor.
    ///
    /// Brand values must be non-empty and fit every field they are written
    /// to, so the overlay never has to truncate them.
    pub fn validate(&self) -> Result<()> {
        if self.ai_timeout_seconds == 0 {
            anyhow::bail!("ai_timeout_seconds must be greater than zero");
        }
        if self.sink_timeout_seconds == 0 {
            anyhow::bail!("sink_timeout_seconds must be greater than zero");
        }
        if self.session_ttl_seconds == 0 {
            anyhow::bail!("session_ttl_seconds must be greater than zero");
        }
        if self.max_sessions == 0 {
            anyhow::bail!("max_sessions must be greater than zero");
        }

        let brand = &self.brand_profile;
        // widest rendering: a four-digit year in place of the placeholder
        let copyright = brand.copyright_notice(Some("0000"));
        if brand.copyright_notice(None).trim().is_empty() {
            anyhow::bail!("brand_profile.copyright must not be empty");
        }
        let checks: [(&str, &str, &[FieldKey]); 7] = [
            (
                "creator",
                &brand.creator,
                &[
                    FieldKey::Exif(ExifField::Artist),
                    FieldKey::Iptc(IptcField::ByLine),
                    FieldKey::Xmp(XmpField::Creator),
                ],
            ),
            (
                "copyright",
                &copyright,
                &[
                    FieldKey::Exif(ExifField::Copyright),
                    FieldKey::Iptc(IptcField::CopyrightNotice),
                    FieldKey::Xmp(XmpField::Rights),
                ],
            ),
            (
                "credit",
                &brand.credit,
                &[FieldKey::Iptc(IptcField::Credit), FieldKey::Xmp(XmpField::Credit)],
            ),
            ("source", &brand.source, &[FieldKey::Xmp(XmpField::Source)]),
            ("website", &brand.website, &[FieldKey::Iptc(IptcField::Contact)]),
            ("category", &brand.category, &[FieldKey::Xmp(XmpField::Category)]),
            ("organization", &brand.organization, &[]),
        ];

        for (name, value, targets) in checks {
            if value.trim().is_empty() {
                anyhow::bail!("brand_profile.{name} must not be empty");
            }
            for target in targets {
                if value.len() > target.max_len() {
                    anyhow::bail!(
                        "brand_profile.{name} is {} bytes, {target} allows {}",
                        value.len(),
                        target.max_len()
                    );
                }
            }
        }

        let joined = brand.supplemental_categories.join(", ");
        let limit = FieldKey::Xmp(XmpField::SupplementalCategories).max_len();
        if joined.len() > limit {
            anyhow::bail!("brand_profile.supplemental_categories exceed {limit} bytes");
        }

        Ok(())
    }

    /// Get the ordered list of enabled AI services.
    pub fn enabled_services(&self) -> Vec<String> {
        self.service_order
            .iter()
            .filter(|name| match name.as_str() {
                "anthropic" => self.ai_services.anthropic.enabled,
                "openai" => self.ai_services.openai.enabled,
                "gemini" => self.ai_services.gemini.enabled,
                _ => false,
            })
            .cloned()
            .collect()
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_seconds)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_secs(self.sink_timeout_seconds)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.session_ttl_seconds, 1800);
        assert_eq!(config.brand_profile.organization, "GroundSwell");
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.ai_timeout_seconds = 12;
        config.brand_profile.phone = "555-0100".to_string();
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.ai_timeout_seconds, 12);
        assert_eq!(loaded.brand_profile.phone, "555-0100");
    }

    #[test]
    fn partial_file_uses_defaults_for_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"session_ttl_seconds": 5, "brand_profile": {"organization": "Acme"}}"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.session_ttl_seconds, 5);
        assert_eq!(config.ai_timeout_seconds, 60);
        assert_eq!(config.brand_profile.organization, "Acme");
        assert_eq!(config.brand_profile.credit, "GroundSwell");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn validate_rejects_zero_ttl() {
        let mut config = Config::default();
        config.session_ttl_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_brand_copyright() {
        let mut config = Config::default();
        config.brand_profile.copyright = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bare_year_copyright() {
        let mut config = Config::default();
        config.brand_profile.copyright = YEAR_PLACEHOLDER.to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn copyright_length_is_checked_with_the_year_filled_in() {
        let mut config = Config::default();
        // 128 bytes raw, 126 once the year replaces the placeholder
        config.brand_profile.copyright = format!("{}{YEAR_PLACEHOLDER}", "c".repeat(122));
        config.validate().unwrap();
        config.brand_profile.copyright = format!("{}{YEAR_PLACEHOLDER}", "c".repeat(125));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("IPTC.CopyrightNotice"), "{err}");
    }

    #[test]
    fn copyright_notice_places_the_year() {
        let mut brand = BrandProfile::default();
        assert_eq!(brand.copyright_notice(Some("2024")), "Copyright 2024 GroundSwell");
        brand.copyright = "© {year}".to_string();
        assert_eq!(brand.copyright_notice(None), "©");
        brand.copyright = "All rights reserved".to_string();
        assert_eq!(brand.copyright_notice(Some("2024")), "All rights reserved");
    }

    #[test]
    fn validate_rejects_credit_longer_than_iptc_limit() {
        let mut config = Config::default();
        config.brand_profile.credit = "x".repeat(33);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("IPTC.Credit"), "{err}");
    }

    #[test]
    fn env_fills_only_empty_keys() {
        let mut config = Config::default();
        config.ai_services.openai.api_key = "sk-file".to_string();
        config.apply_env_with(|name| match name {
            "ANTHROPIC_API_KEY" => Some(" sk-ant-env ".to_string()),
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            _ => None,
        });
        assert_eq!(config.ai_services.anthropic.api_key, "sk-ant-env");
        assert_eq!(config.ai_services.openai.api_key, "sk-file");
        assert!(config.ai_services.gemini.api_key.is_empty());
    }

    #[test]
    fn enabled_services_follow_order() {
        let mut config = Config::default();
        config.ai_services.gemini.enabled = true;
        config.service_order = vec!["gemini".into(), "anthropic".into(), "bogus".into()];
        assert_eq!(config.enabled_services(), vec!["gemini", "anthropic"]);
    }
}
