//! Template catalog — localized reply texts keyed by stars, period and language.
//!
//! The catalog is a JSON object `{"<stars>_<period>_<lang>": "text with {name}"}`.
//! Every entry is validated when the catalog is loaded, so resolution at
//! runtime can only fail with [`TemplateError::NotFound`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::error::{ConfigError, TemplateError};
use crate::pipeline::types::Period;

/// The only placeholder a template may contain.
pub const NAME_PLACEHOLDER: &str = "{name}";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("placeholder regex is valid"));

/// Composite lookup key for a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub stars: u8,
    pub period: Period,
    pub language: String,
}

impl TemplateKey {
    pub fn new(stars: u8, period: Period, language: impl Into<String>) -> Self {
        Self {
            stars,
            period,
            language: language.into(),
        }
    }
}

impl std::fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.stars, self.period, self.language)
    }
}

impl std::str::FromStr for TemplateKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '_');
        let (Some(stars), Some(period), Some(language)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err("expected <stars>_<period>_<language>".into());
        };
        let stars: u8 = stars
            .parse()
            .ok()
            .filter(|s| (1..=5).contains(s))
            .ok_or_else(|| format!("stars must be 1-5, got {stars:?}"))?;
        let period: Period = period.parse()?;
        if language.is_empty() || language.chars().any(|c| !c.is_ascii_lowercase()) {
            return Err(format!("language must be lowercase letters, got {language:?}"));
        }
        Ok(Self::new(stars, period, language))
    }
}

/// A validated reply template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    /// Validate template text: exactly one `{name}` and no other placeholders.
    pub fn parse(key: &str, text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        let mut name_count = 0;
        for cap in PLACEHOLDER_RE.captures_iter(&text) {
            match &cap[1] {
                "name" => name_count += 1,
                other => {
                    return Err(TemplateError::Malformed {
                        key: key.to_string(),
                        reason: format!("unknown placeholder {{{other}}}"),
                    });
                }
            }
        }
        if name_count != 1 {
            return Err(TemplateError::Malformed {
                key: key.to_string(),
                reason: format!("expected exactly one {NAME_PLACEHOLDER}, found {name_count}"),
            });
        }
        Ok(Self { text })
    }

    /// Substitute the display name into the placeholder.
    pub fn render(&self, name: &str) -> String {
        self.text.replacen(NAME_PLACEHOLDER, name, 1)
    }
}

/// Immutable mapping from [`TemplateKey`] to [`Template`].
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<TemplateKey, Template>,
}

impl TemplateCatalog {
    /// Build a catalog from raw key/text pairs, validating every entry.
    pub fn from_entries<I, K, V>(entries: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut templates = HashMap::new();
        for (raw_key, text) in entries {
            let raw_key = raw_key.as_ref();
            let key: TemplateKey = raw_key.parse().map_err(|reason| TemplateError::Malformed {
                key: raw_key.to_string(),
                reason,
            })?;
            let template = Template::parse(raw_key, text)?;
            templates.insert(key, template);
        }
        Ok(Self { templates })
    }

    /// Parse a catalog from a JSON object string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, String> = serde_json::from_str(json)
            .map_err(|e| ConfigError::ParseError(format!("template catalog: {e}")))?;
        Ok(Self::from_entries(raw)?)
    }

    /// Load and validate the catalog file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&json)?;
        info!(path = %path.display(), templates = catalog.len(), "Template catalog loaded");
        Ok(catalog)
    }

    /// Pure lookup. A missing key never falls back to another language or period.
    pub fn resolve(
        &self,
        stars: u8,
        period: Period,
        language: &str,
    ) -> Result<&Template, TemplateError> {
        let key = TemplateKey::new(stars, period, language);
        self.templates
            .get(&key)
            .ok_or_else(|| TemplateError::NotFound {
                key: key.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Neutral greeting used when the reviewer has no display name.
pub fn generic_name(language: &str) -> &'static str {
    match language {
        "it" | "es" => "Cliente",
        "fr" => "Client",
        "de" => "Kunde",
        _ => "Customer",
    }
}
