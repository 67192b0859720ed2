use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Default value functions for serde
fn default_true() -> bool {
    true
}

/// Namespace for v5 rule ids. Changing it changes every generated id.
pub const DEFAULT_RULE_NAMESPACE: Uuid = Uuid::from_u128(0x5d8d0dd5_acd2_4c46_b565_aa1fb03617af);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// UUID namespace used for deterministic rule ids
    #[serde(default = "default_namespace")]
    pub namespace: Uuid,
    #[serde(default)]
    pub text_extraction: TextExtractionConfig,
    #[serde(default)]
    pub tabular: TabularConfig,
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub references: ReferenceCheckConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_namespace() -> Uuid {
    DEFAULT_RULE_NAMESPACE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextExtractionConfig {
    /// Must exceed the tallest page so the composite line key orders pages first
    #[serde(default = "default_y_cap")]
    pub y_cap: f64,
    /// Leading items of every page that carry the running header
    #[serde(default = "default_page_header_items")]
    pub page_header_items: usize,
    /// Font of the first token of a "Property:" line
    #[serde(default = "default_property_key_font")]
    pub property_key_font: String,
    /// Suffix a property line has to end with
    #[serde(default = "default_property_key_suffix")]
    pub property_key_suffix: String,
    /// Line that terminates a rule block
    #[serde(default = "default_end_of_rule")]
    pub end_of_rule_pattern: String,
}

fn default_y_cap() -> f64 {
    1000.0
}

fn default_page_header_items() -> usize {
    5
}

fn default_property_key_font() -> String {
    "^g_d0_f4$".to_string()
}

fn default_property_key_suffix() -> String {
    ":$".to_string()
}

fn default_end_of_rule() -> String {
    "^CIS Controls:$".to_string()
}

impl Default for TextExtractionConfig {
    fn default() -> Self {
        Self {
            y_cap: default_y_cap(),
            page_header_items: default_page_header_items(),
            property_key_font: default_property_key_font(),
            property_key_suffix: default_property_key_suffix(),
            end_of_rule_pattern: default_end_of_rule(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularConfig {
    /// Only sheets whose name starts with this are read (e.g. "Level 1 - Master Node")
    #[serde(default = "default_sheet_prefix")]
    pub sheet_prefix: String,
}

fn default_sheet_prefix() -> String {
    "Level".to_string()
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            sheet_prefix: default_sheet_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_template_type")]
    pub template_type: String,
    #[serde(default = "default_migration_version")]
    pub migration_version: String,
    #[serde(default = "default_migration_version")]
    pub core_migration_version: String,
}

fn default_template_type() -> String {
    "csp-rule-template".to_string()
}

fn default_migration_version() -> String {
    "8.7.0".to_string()
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            template_type: default_template_type(),
            migration_version: default_migration_version(),
            core_migration_version: default_migration_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceCheckConfig {
    /// HEAD-check every reference URL and drop the broken ones
    #[serde(default)]
    pub enabled: bool,
    /// Upper bound on in-flight checks
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_concurrent_checks() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ReferenceCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrent_checks: default_max_concurrent_checks(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root of `<benchmark id>/rules/cis_x_y_z/data.yaml`
    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,
    /// Where `<rule id>.json` templates go
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    /// Also write template artifacts next to the records
    #[serde(default = "default_true")]
    pub write_templates: bool,
    /// Only rewrite records whose rule directory already exists
    #[serde(default)]
    pub existing_rules_only: bool,
}

fn default_rules_dir() -> String {
    "bundle/compliance".to_string()
}

fn default_templates_dir() -> String {
    "kibana/csp_rule_template".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            rules_dir: default_rules_dir(),
            templates_dir: default_templates_dir(),
            write_templates: true,
            existing_rules_only: false,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_RULE_NAMESPACE,
            text_extraction: TextExtractionConfig::default(),
            tabular: TabularConfig::default(),
            template: TemplateConfig::default(),
            references: ReferenceCheckConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Load config from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {path}"))?;
        let config: GeneratorConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {path}"))?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                tracing::warn!("failed to load config from {p}: {e:#}, using defaults");
                Self::default()
            }),
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: GeneratorConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.namespace, DEFAULT_RULE_NAMESPACE);
        assert_eq!(config.text_extraction.y_cap, 1000.0);
        assert_eq!(config.text_extraction.page_header_items, 5);
        assert_eq!(config.tabular.sheet_prefix, "Level");
        assert_eq!(config.template.core_migration_version, "8.7.0");
        assert!(!config.references.enabled);
        assert!(config.output.write_templates);
    }

    #[test]
    fn partial_yaml_overrides_only_given_fields() {
        let yaml = "
text_extraction:
  page_header_items: 0
references:
  enabled: true
";
        let config: GeneratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.text_extraction.page_header_items, 0);
        assert_eq!(config.text_extraction.property_key_font, "^g_d0_f4$");
        assert!(config.references.enabled);
        assert_eq!(config.references.max_concurrent_checks, 8);
    }

    #[test]
    fn namespace_constant_matches_its_string_form() {
        assert_eq!(
            DEFAULT_RULE_NAMESPACE.to_string(),
            "5d8d0dd5-acd2-4c46-b565-aa1fb03617af"
        );
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = GeneratorConfig::load_with_fallback(Some("/nonexistent/rulegen.yaml"));
        assert_eq!(config.output.rules_dir, "bundle/compliance");
    }
}
