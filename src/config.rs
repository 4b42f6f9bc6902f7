//! Processor configuration.
//!
//! Everything that was per-process state (selector list, import filters,
//! custom tags, empty-block allowances) lives in one [`ProcessorConfig`]
//! handed to the processor at construction.

use crate::error::ConfigurationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorType {
    String,
    Integer,
}

/// One selector dimension of a docSet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SelectorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl SelectorSpec {
    pub fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: SelectorType::String,
            regex: None,
            min: None,
            max: None,
            enum_values: None,
        }
    }

    pub fn with_regex(mut self, regex: &str) -> Self {
        self.regex = Some(regex.to_string());
        self
    }

    fn bad(&self, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::BadSelectorSpec {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Check the spec itself
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.is_empty() {
            return Err(self.bad("empty name"));
        }
        match self.kind {
            SelectorType::String => {
                if self.min.is_some() || self.max.is_some() {
                    return Err(self.bad("string selectors cannot have min or max"));
                }
                if let Some(re) = &self.regex {
                    Regex::new(re).map_err(|e| self.bad(format!("bad regex: {}", e)))?;
                }
            }
            SelectorType::Integer => {
                if self.regex.is_some() {
                    return Err(self.bad("integer selectors cannot have a regex"));
                }
                if let (Some(min), Some(max)) = (self.min, self.max) {
                    if min > max {
                        return Err(self.bad(format!("min {} is greater than max {}", min, max)));
                    }
                }
            }
        }
        if let Some(values) = &self.enum_values {
            for v in values {
                let ok = match self.kind {
                    SelectorType::String => v.is_string(),
                    SelectorType::Integer => v.is_i64(),
                };
                if !ok {
                    return Err(self.bad(format!("enum value {} has the wrong type", v)));
                }
            }
        }
        Ok(())
    }

    /// Check a value supplied for this selector
    pub fn validate_value(&self, value: &SelectorValue) -> Result<(), ConfigurationError> {
        let bad = |reason: &str| ConfigurationError::BadSelectorValue {
            name: self.name.clone(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        match (self.kind, value) {
            (SelectorType::String, SelectorValue::String(s)) => {
                if let Some(re) = &self.regex {
                    let re = Regex::new(re).map_err(|e| self.bad(e.to_string()))?;
                    if !re.is_match(s) {
                        return Err(bad("does not match regex"));
                    }
                }
                let listed = self
                    .enum_values
                    .as_ref()
                    .is_none_or(|values| values.iter().any(|v| v.as_str() == Some(s.as_str())));
                if !listed {
                    return Err(bad("not in enum"));
                }
            }
            (SelectorType::Integer, SelectorValue::Integer(n)) => {
                if self.min.is_some_and(|min| *n < min) {
                    return Err(bad("below min"));
                }
                if self.max.is_some_and(|max| *n > max) {
                    return Err(bad("above max"));
                }
                let listed = self
                    .enum_values
                    .as_ref()
                    .is_none_or(|values| values.iter().any(|v| v.as_i64() == Some(*n)));
                if !listed {
                    return Err(bad("not in enum"));
                }
            }
            _ => return Err(bad("wrong type")),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorValue {
    Integer(i64),
    String(String),
}

impl std::fmt::Display for SelectorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorValue::Integer(n) => write!(f, "{}", n),
            SelectorValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for SelectorValue {
    fn from(s: &str) -> Self {
        SelectorValue::String(s.to_string())
    }
}

impl From<i64> for SelectorValue {
    fn from(n: i64) -> Self {
        SelectorValue::Integer(n)
    }
}

pub type Selectors = BTreeMap<String, SelectorValue>;

/// Build a selector map from pairs
pub fn selectors<V: Into<SelectorValue>>(pairs: impl IntoIterator<Item = (&'static str, V)>) -> Selectors {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect()
}

/// Include/exclude prefix lists applied to grafts and scopes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_grafts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_grafts: Option<Vec<String>>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.include_scopes.is_none()
            && self.exclude_scopes.is_none()
            && self.include_grafts.is_none()
            && self.exclude_grafts.is_none()
    }

    fn admits(include: &Option<Vec<String>>, exclude: &Option<Vec<String>>, value: &str) -> bool {
        let included = include
            .as_ref()
            .is_none_or(|inc| inc.iter().any(|p| value.starts_with(p.as_str())));
        let excluded = exclude
            .as_ref()
            .is_some_and(|exc| exc.iter().any(|p| value.starts_with(p.as_str())));
        included && !excluded
    }

    pub fn keeps_scope(&self, label: &str) -> bool {
        Self::admits(&self.include_scopes, &self.exclude_scopes, label)
    }

    pub fn keeps_graft(&self, graft_type: &str) -> bool {
        Self::admits(&self.include_grafts, &self.exclude_grafts, graft_type)
    }
}

/// Extra tags for the tag table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTags {
    #[serde(default)]
    pub heading: Vec<String>,
    #[serde(default)]
    pub paragraph: Vec<String>,
    #[serde(default)]
    pub character: Vec<String>,
    #[serde(default)]
    pub word: Vec<String>,
}

impl CustomTags {
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.heading
            .iter()
            .chain(&self.paragraph)
            .chain(&self.character)
            .chain(&self.word)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorConfig {
    #[serde(default = "default_selectors")]
    pub selectors: Vec<SelectorSpec>,
    #[serde(default)]
    pub filter: FilterOptions,
    #[serde(default)]
    pub custom_tags: CustomTags,
    /// Block labels kept by tidy even when they hold no tokens
    #[serde(default)]
    pub empty_blocks: Vec<String>,
    /// Entries in the cv result cache
    #[serde(default = "default_cache_size")]
    pub cv_cache_size: usize,
}

fn default_selectors() -> Vec<SelectorSpec> {
    vec![
        SelectorSpec::string("lang").with_regex("^[A-Za-z0-9_-]+$"),
        SelectorSpec::string("abbr"),
    ]
}

fn default_cache_size() -> usize {
    256
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            selectors: default_selectors(),
            filter: FilterOptions::default(),
            custom_tags: CustomTags::default(),
            empty_blocks: Vec::new(),
            cv_cache_size: default_cache_size(),
        }
    }
}

impl ProcessorConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(text).map_err(|e| ConfigurationError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Validate the selector list and custom tags
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.selectors.is_empty() {
            return Err(ConfigurationError::Config("no selectors".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for spec in &self.selectors {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigurationError::BadSelectorSpec {
                    name: spec.name.clone(),
                    reason: "duplicate selector".to_string(),
                });
            }
        }
        for tag in self.custom_tags.all() {
            if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
                return Err(ConfigurationError::BadCustomTag(tag.clone()));
            }
        }
        Ok(())
    }

    /// Check a selector map against the spec list
    pub fn validate_selectors(&self, selectors: &Selectors) -> Result<(), ConfigurationError> {
        for key in selectors.keys() {
            if !self.selectors.iter().any(|s| &s.name == key) {
                return Err(ConfigurationError::UnexpectedSelector(key.clone()));
            }
        }
        for spec in &self.selectors {
            let value = selectors
                .get(&spec.name)
                .ok_or_else(|| ConfigurationError::MissingSelector(spec.name.clone()))?;
            spec.validate_value(value)?;
        }
        Ok(())
    }

    /// DocSet id: selector values in spec order joined by `_`
    pub fn selector_string(&self, selectors: &Selectors) -> String {
        self.selectors
            .iter()
            .filter_map(|s| selectors.get(&s.name))
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ProcessorConfig::default();
        config.validate().unwrap();
        let sel = selectors([("lang", "eng"), ("abbr", "web")]);
        config.validate_selectors(&sel).unwrap();
        assert_eq!(config.selector_string(&sel), "eng_web");
    }

    #[test]
    fn test_bad_selector_specs() {
        let mut spec = SelectorSpec::string("lang");
        spec.min = Some(1);
        assert!(spec.validate().is_err());

        let mut spec = SelectorSpec::string("n");
        spec.kind = SelectorType::Integer;
        spec.min = Some(5);
        spec.max = Some(1);
        assert!(spec.validate().is_err());

        let spec = SelectorSpec::string("x").with_regex("(");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_selector_values() {
        let config = ProcessorConfig::default();
        assert!(matches!(
            config.validate_selectors(&selectors([("lang", "eng")])),
            Err(ConfigurationError::MissingSelector(_))
        ));
        assert!(matches!(
            config.validate_selectors(&selectors([("lang", "eng"), ("abbr", "x"), ("v", "1")])),
            Err(ConfigurationError::UnexpectedSelector(_))
        ));
        assert!(config
            .validate_selectors(&selectors([("lang", "e n"), ("abbr", "x")]))
            .is_err());
    }

    #[test]
    fn test_filter_options() {
        let f = FilterOptions {
            exclude_scopes: Some(vec!["attribute/".to_string()]),
            include_grafts: Some(vec!["footnote".to_string()]),
            ..FilterOptions::default()
        };
        assert!(f.keeps_scope("verse/1"));
        assert!(!f.keeps_scope("attribute/spanWithAtts/w/lemma/0/x"));
        assert!(f.keeps_graft("footnote"));
        assert!(!f.keeps_graft("heading"));
        assert!(FilterOptions::default().is_empty());
    }

    #[test]
    fn test_config_from_json() {
        let config = ProcessorConfig::from_json(
            r#"{"selectors": [{"name": "lang", "type": "string"}, {"name": "v", "type": "integer", "min": 1}],
                "customTags": {"character": ["zx"]}}"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.selectors.len(), 2);
        assert_eq!(config.custom_tags.character, vec!["zx".to_string()]);
        let sel: Selectors = [
            ("lang".to_string(), SelectorValue::from("fra")),
            ("v".to_string(), SelectorValue::from(3)),
        ]
        .into_iter()
        .collect();
        config.validate_selectors(&sel).unwrap();
        assert_eq!(config.selector_string(&sel), "fra_3");
    }
}
