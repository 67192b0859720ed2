//! Rule record → saved-object template.
//!
//! The template wraps the rule in the saved-object envelope the posture
//! integration ships (`csp-rule-template`). It is a pure reshape: no field
//! is recomputed, the three optional fields move to the front and the
//! rule's package name is added as `rego_rule_id`.

use crate::config::TemplateConfig;
use crate::types::{BenchmarkInfo, Rule, RuleDocument};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Saved-object envelope around one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateArtifact {
    pub id: String,
    #[serde(rename = "type")]
    pub template_type: String,
    pub attributes: TemplateAttributes,
    #[serde(rename = "migrationVersion")]
    pub migration_version: BTreeMap<String, String>,
    #[serde(rename = "coreMigrationVersion")]
    pub core_migration_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAttributes {
    pub enabled: bool,
    pub muted: bool,
    pub metadata: TemplateMetadata,
}

/// Rule fields as laid out inside a template. Field order is the output
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub impact: String,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    pub id: String,
    pub name: String,
    pub rule_number: String,
    pub profile_applicability: String,
    pub description: String,
    pub rationale: String,
    pub audit: String,
    pub remediation: String,
    pub section: String,
    pub version: String,
    pub tags: Vec<String>,
    pub benchmark: BenchmarkInfo,
    pub rego_rule_id: String,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

impl From<&Rule> for TemplateMetadata {
    fn from(rule: &Rule) -> Self {
        Self {
            impact: rule.impact.clone(),
            default_value: rule.default_value.clone(),
            references: rule.references.clone(),
            id: rule.id.clone(),
            name: rule.name.clone(),
            rule_number: rule.rule_number.clone(),
            profile_applicability: rule.profile_applicability.clone(),
            description: rule.description.clone(),
            rationale: rule.rationale.clone(),
            audit: rule.audit.clone(),
            remediation: rule.remediation.clone(),
            section: rule.section.clone(),
            version: rule.version.clone(),
            tags: rule.tags.clone(),
            benchmark: rule.benchmark.clone(),
            rego_rule_id: rule.package_name(),
        }
    }
}

impl TemplateMetadata {
    /// Back to the canonical record; `rego_rule_id` is derived and dropped
    pub fn into_rule(self) -> Rule {
        Rule {
            id: self.id,
            name: self.name,
            rule_number: self.rule_number,
            profile_applicability: self.profile_applicability,
            description: self.description,
            rationale: self.rationale,
            audit: self.audit,
            remediation: self.remediation,
            impact: self.impact,
            default_value: self.default_value,
            references: self.references,
            section: self.section,
            version: self.version,
            tags: self.tags,
            benchmark: self.benchmark,
        }
    }
}

/// Builds template artifacts with the configured saved-object type and
/// migration versions.
pub struct TemplateBuilder {
    config: TemplateConfig,
}

impl Default for TemplateBuilder {
    fn default() -> Self {
        Self::new(TemplateConfig::default())
    }
}

impl TemplateBuilder {
    pub fn new(config: TemplateConfig) -> Self {
        Self { config }
    }

    pub fn migrate(&self, rule: &Rule) -> TemplateArtifact {
        TemplateArtifact {
            id: rule.id.clone(),
            template_type: self.config.template_type.clone(),
            attributes: TemplateAttributes {
                enabled: true,
                muted: false,
                metadata: TemplateMetadata::from(rule),
            },
            migration_version: BTreeMap::from([(
                self.config.template_type.clone(),
                self.config.migration_version.clone(),
            )]),
            core_migration_version: self.config.core_migration_version.clone(),
        }
    }

    /// Template for a record read back from `data.yaml`
    pub fn migrate_document(&self, document: &RuleDocument) -> TemplateArtifact {
        tracing::debug!(rule = %document.metadata.benchmark.rule_number, "migrating rule document");
        self.migrate(&document.metadata)
    }
}

/// JSON with 4-space indentation; byte-identical for identical input
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .context("serializing template")?;
    String::from_utf8(buf).context("template is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn rule() -> Rule {
        Rule {
            id: "0b0ba4a5-6b4e-5d1c-9c24-8b1d2b0ea7c1".to_string(),
            name: "Ensure that the --profiling argument is set to false".to_string(),
            rule_number: "1.3.2".to_string(),
            profile_applicability: "* Level 1 - Master Node".to_string(),
            description: "Disable profiling.".to_string(),
            rationale: "Profiling reveals details.".to_string(),
            audit: "ps -ef | grep kube-controller-manager".to_string(),
            remediation: "Set --profiling=false".to_string(),
            impact: String::new(),
            default_value: Some("By default, profiling is enabled.".to_string()),
            references: vec!["https://kubernetes.io/docs/".to_string()],
            section: "Controller Manager".to_string(),
            version: "1.0".to_string(),
            tags: vec![
                "CIS".to_string(),
                "Kubernetes".to_string(),
                "CIS 1.3.2".to_string(),
                "Controller Manager".to_string(),
            ],
            benchmark: BenchmarkInfo {
                name: "CIS Kubernetes V1.23".to_string(),
                version: "v1.0.1".to_string(),
                id: "cis_k8s".to_string(),
                rule_number: "1.3.2".to_string(),
                posture_type: "kspm".to_string(),
            },
        }
    }

    #[test]
    fn envelope_carries_type_versions_and_flags() {
        let artifact = TemplateBuilder::default().migrate(&rule());
        let json: Value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["id"], "0b0ba4a5-6b4e-5d1c-9c24-8b1d2b0ea7c1");
        assert_eq!(json["type"], "csp-rule-template");
        assert_eq!(json["attributes"]["enabled"], true);
        assert_eq!(json["attributes"]["muted"], false);
        assert_eq!(json["migrationVersion"]["csp-rule-template"], "8.7.0");
        assert_eq!(json["coreMigrationVersion"], "8.7.0");
        assert_eq!(json["attributes"]["metadata"]["rego_rule_id"], "cis_1_3_2");
    }

    #[test]
    fn optional_fields_lead_and_falsy_ones_are_omitted() {
        let text = to_json_pretty(&TemplateBuilder::default().migrate(&rule())).unwrap();
        assert!(!text.contains("\"impact\""));
        let default_at = text.find("\"default_value\"").unwrap();
        let references_at = text.find("\"references\"").unwrap();
        let name_at = text.find("\"name\"").unwrap();
        assert!(default_at < references_at);
        assert!(references_at < name_at);
    }

    #[test]
    fn pretty_json_uses_four_spaces_and_is_stable() {
        let builder = TemplateBuilder::default();
        let a = to_json_pretty(&builder.migrate(&rule())).unwrap();
        let b = to_json_pretty(&builder.migrate(&rule())).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("{\n    \"id\""));
        assert!(a.contains("\n        \"enabled\": true"));
    }

    #[test]
    fn metadata_round_trips_to_the_rule() {
        let original = rule();
        let text = to_json_pretty(&TemplateBuilder::default().migrate(&original)).unwrap();
        let parsed: TemplateArtifact = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.attributes.metadata.into_rule(), original);
    }

    #[test]
    fn migrate_document_uses_persisted_record() {
        let document = RuleDocument { metadata: rule() };
        let artifact = TemplateBuilder::default().migrate_document(&document);
        assert_eq!(artifact.id, document.metadata.id);
        assert_eq!(artifact.attributes.metadata.section, "Controller Manager");
    }
}
