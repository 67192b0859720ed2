//! Field mapping → canonical `Rule`.
//!
//! Both extractors end here, so everything that has to be identical across
//! PDF and spreadsheet sources (ids, tags, reference splitting, code block
//! fixes) lives in this module.

use crate::benchmarks::resolve_benchmark_kind;
use crate::types::{BenchmarkInfo, BenchmarkMetadata, FieldMapping, Rule, RULE_VERSION};
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

const CODE_FENCE: &str = "```";

// "1. https://..." — enumerated reference lists in PDF text
static LIST_ENUMERATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s+").unwrap());

pub struct RuleNormalizer {
    namespace: Uuid,
}

impl RuleNormalizer {
    pub fn new(namespace: Uuid) -> Self {
        Self { namespace }
    }

    /// v5 UUID of "<benchmark name> <rule name>"; stable across runs
    pub fn rule_id(&self, benchmark_name: &str, rule_name: &str) -> String {
        let seed = format!("{benchmark_name} {rule_name}");
        Uuid::new_v5(&self.namespace, seed.as_bytes()).to_string()
    }

    /// Build the canonical record. Missing fields become empty values; only
    /// the known rule properties are read from `fields`.
    pub fn normalize(
        &self,
        fields: &FieldMapping,
        benchmark: &BenchmarkMetadata,
        profile_applicability: &str,
    ) -> Rule {
        let field = |key: &str| fields.get(key).cloned().unwrap_or_default();

        let name = field("name").trim().to_string();
        let rule_number = field("rule_number").trim().to_string();
        let section = field("section").trim().to_string();
        let kind = resolve_benchmark_kind(&benchmark.name);

        let tags = filter_falsy([
            "CIS".to_string(),
            kind.tag.clone(),
            format!("CIS {rule_number}"),
            section.clone(),
        ]);

        let default_value = fields
            .get("default_value")
            .filter(|value| !value.trim().is_empty())
            .map(|value| fix_code_block(value.clone()));

        Rule {
            id: self.rule_id(&benchmark.name, &name),
            profile_applicability: format!("* {profile_applicability}"),
            description: fix_code_block(field("description")),
            rationale: fix_code_block(field("rationale")),
            audit: fix_code_block(field("audit")),
            remediation: fix_code_block(field("remediation")),
            impact: fix_code_block(field("impact")),
            default_value,
            references: parse_references(&field("references")),
            version: RULE_VERSION.to_string(),
            tags,
            benchmark: BenchmarkInfo {
                name: benchmark.name.clone(),
                version: benchmark.version.clone(),
                id: kind.id,
                rule_number: rule_number.clone(),
                posture_type: kind.posture_type,
            },
            name,
            rule_number,
            section,
        }
    }
}

/// Split raw reference prose into URLs, keeping order and duplicates.
///
/// Sources glue several URLs together with ':' ("…/a:https://…/b"), so every
/// ":http" starts a new entry before splitting on newlines.
pub fn parse_references(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    text.replace(":http", "\n http")
        .lines()
        .map(|line| LIST_ENUMERATOR.replace(line.trim(), "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// A value ending in a code fence gets a trailing newline so the renderer
/// closes the block.
pub fn fix_code_block(value: String) -> String {
    if value.ends_with(CODE_FENCE) {
        value + "\n"
    } else {
        value
    }
}

/// Drop empty entries, keep order
pub fn filter_falsy<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    values.into_iter().filter(|v| !v.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RULE_NAMESPACE;

    fn k8s() -> BenchmarkMetadata {
        BenchmarkMetadata {
            name: "CIS Kubernetes V1.23".to_string(),
            version: "v1.0.1".to_string(),
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> FieldMapping {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn id_is_deterministic_and_name_sensitive() {
        let normalizer = RuleNormalizer::new(DEFAULT_RULE_NAMESPACE);
        let a = normalizer.rule_id("CIS Kubernetes V1.23", "Ensure X");
        let b = normalizer.rule_id("CIS Kubernetes V1.23", "Ensure X");
        let c = normalizer.rule_id("CIS Kubernetes V1.23", "Ensure Y");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 5);
    }

    #[test]
    fn normalize_derives_tags_profile_and_benchmark_block() {
        let normalizer = RuleNormalizer::new(DEFAULT_RULE_NAMESPACE);
        let rule = normalizer.normalize(
            &fields(&[
                ("name", "Ensure X "),
                ("rule_number", "1.2.3"),
                ("section", "API Server"),
                ("description", "desc"),
                ("unrelated", "ignored"),
            ]),
            &k8s(),
            "Level 1 - Master Node",
        );
        assert_eq!(rule.name, "Ensure X");
        assert_eq!(rule.profile_applicability, "* Level 1 - Master Node");
        assert_eq!(rule.tags, ["CIS", "Kubernetes", "CIS 1.2.3", "API Server"]);
        assert_eq!(rule.benchmark.id, "cis_k8s");
        assert_eq!(rule.benchmark.rule_number, "1.2.3");
        assert_eq!(rule.benchmark.posture_type, "kspm");
        assert_eq!(rule.version, "1.0");
        assert!(rule.references.is_empty());
        assert_eq!(rule.default_value, None);
    }

    #[test]
    fn unknown_benchmark_drops_type_tag() {
        let normalizer = RuleNormalizer::new(DEFAULT_RULE_NAMESPACE);
        let meta = BenchmarkMetadata {
            name: "CIS Something Else".to_string(),
            version: "v1".to_string(),
        };
        let rule = normalizer.normalize(&fields(&[("rule_number", "1.1")]), &meta, "Level 1");
        assert_eq!(rule.tags, ["CIS", "CIS 1.1"]);
        assert_eq!(rule.benchmark.id, "");
    }

    #[test]
    fn references_split_on_glued_urls_and_newlines() {
        let refs = parse_references(
            "https://a.example/one:https://b.example/two\nhttps://c.example/three",
        );
        assert_eq!(
            refs,
            [
                "https://a.example/one",
                "https://b.example/two",
                "https://c.example/three"
            ]
        );
    }

    #[test]
    fn references_keep_duplicates_and_strip_enumerators() {
        let refs = parse_references("1. https://a.example\n2. https://a.example\n");
        assert_eq!(refs, ["https://a.example", "https://a.example"]);
        assert!(parse_references("").is_empty());
    }

    #[test]
    fn trailing_code_fence_gets_newline() {
        assert_eq!(fix_code_block("run:\n```\nls\n```".to_string()), "run:\n```\nls\n```\n");
        assert_eq!(fix_code_block("plain".to_string()), "plain");
        assert_eq!(fix_code_block("```\n".to_string()), "```\n");
    }

    #[test]
    fn default_value_kept_only_when_present() {
        let normalizer = RuleNormalizer::new(DEFAULT_RULE_NAMESPACE);
        let rule = normalizer.normalize(
            &fields(&[("default_value", "By default, profiling is enabled.\n")]),
            &k8s(),
            "Level 1",
        );
        assert_eq!(
            rule.default_value.as_deref(),
            Some("By default, profiling is enabled.\n")
        );
    }
}
