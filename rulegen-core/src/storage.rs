use crate::error::RulegenError;
use crate::migration::{to_json_pretty, TemplateArtifact};
use crate::types::{rule_package_name, Rule, RuleDocument};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Storage abstraction for rule records and their templates
pub trait RuleStorage {
    /// Whether the rule has a package directory (i.e. an implementation)
    fn rule_exists(&self, benchmark_id: &str, rule_number: &str) -> bool;

    // Rule records: <benchmark id>/rules/cis_x_y_z/data.yaml
    fn load_rule(&self, benchmark_id: &str, rule_number: &str) -> Result<Option<RuleDocument>>;
    fn store_rule(&self, rule: &Rule) -> Result<()>;
    fn list_rules(&self, benchmark_id: &str) -> Result<Vec<RuleDocument>>;

    // Templates: <rule id>.json
    fn store_template(&self, template: &TemplateArtifact) -> Result<()>;
}

/// File-based storage under a rules root and a templates directory
pub struct FileStorage {
    rules_dir: PathBuf,
    templates_dir: PathBuf,
}

impl FileStorage {
    pub fn new(rules_dir: &str, templates_dir: &str) -> Result<Self> {
        fs::create_dir_all(templates_dir)
            .with_context(|| format!("creating templates dir {templates_dir}"))?;

        Ok(Self {
            rules_dir: PathBuf::from(rules_dir),
            templates_dir: PathBuf::from(templates_dir),
        })
    }

    fn benchmark_rules_dir(&self, benchmark_id: &str) -> PathBuf {
        self.rules_dir.join(benchmark_id).join("rules")
    }

    fn rule_dir(&self, benchmark_id: &str, rule_number: &str) -> PathBuf {
        self.benchmark_rules_dir(benchmark_id)
            .join(rule_package_name(rule_number))
    }

    fn template_path(&self, id: &str) -> PathBuf {
        self.templates_dir.join(format!("{id}.json"))
    }
}

fn read_document(path: &Path) -> Result<RuleDocument> {
    let yaml = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut document: RuleDocument = serde_yaml::from_str(&yaml)
        .map_err(|e| anyhow!("Failed to deserialize rule record {}: {}", path.display(), e))?;

    let rule = &mut document.metadata;
    if rule.rule_number.is_empty() {
        rule.rule_number = rule.benchmark.rule_number.clone();
    }
    Ok(document)
}

impl RuleStorage for FileStorage {
    fn rule_exists(&self, benchmark_id: &str, rule_number: &str) -> bool {
        self.rule_dir(benchmark_id, rule_number).is_dir()
    }

    fn load_rule(&self, benchmark_id: &str, rule_number: &str) -> Result<Option<RuleDocument>> {
        let path = self.rule_dir(benchmark_id, rule_number).join("data.yaml");
        if path.exists() {
            Ok(Some(read_document(&path)?))
        } else {
            Ok(None)
        }
    }

    fn store_rule(&self, rule: &Rule) -> Result<()> {
        let dir = self.rule_dir(&rule.benchmark.id, &rule.rule_number);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        let document = RuleDocument {
            metadata: rule.clone(),
        };
        let yaml = serde_yaml::to_string(&document)
            .map_err(|e| anyhow!("Failed to serialize rule {}: {}", rule.rule_number, e))?;
        fs::write(dir.join("data.yaml"), yaml)?;
        Ok(())
    }

    fn list_rules(&self, benchmark_id: &str) -> Result<Vec<RuleDocument>> {
        let dir = self.benchmark_rules_dir(benchmark_id);
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("listing {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path().join("data.yaml"))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        paths.iter().map(|path| read_document(path)).collect()
    }

    fn store_template(&self, template: &TemplateArtifact) -> Result<()> {
        let path = self.template_path(&template.id);
        fs::write(&path, to_json_pretty(template)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// No-op storage: nothing exists, nothing is written
pub struct NoOpStorage;

impl Default for NoOpStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl NoOpStorage {
    pub fn new() -> Self {
        Self
    }
}

impl RuleStorage for NoOpStorage {
    fn rule_exists(&self, _benchmark_id: &str, _rule_number: &str) -> bool {
        false
    }

    fn load_rule(&self, _benchmark_id: &str, _rule_number: &str) -> Result<Option<RuleDocument>> {
        Ok(None)
    }

    fn store_rule(&self, _rule: &Rule) -> Result<()> {
        Ok(())
    }

    fn list_rules(&self, _benchmark_id: &str) -> Result<Vec<RuleDocument>> {
        Ok(Vec::new())
    }

    fn store_template(&self, _template: &TemplateArtifact) -> Result<()> {
        Ok(())
    }
}

/// Carry hand-maintained values over from the persisted record: its id and
/// a non-empty default value win over the freshly generated ones.
pub fn merge_existing(mut rule: Rule, existing: Option<&RuleDocument>) -> Rule {
    let Some(existing) = existing.map(|doc| &doc.metadata) else {
        return rule;
    };

    if !existing.id.is_empty() {
        rule.id = existing.id.clone();
    }
    if let Some(default_value) = existing
        .default_value
        .as_ref()
        .filter(|value| !value.trim().is_empty())
    {
        rule.default_value = Some(default_value.clone());
    }
    rule
}

/// Merge and write every rule; with `existing_only`, rules without a
/// package directory are skipped. Returns the rules as written. A rule
/// whose benchmark did not resolve to a short id is an error, since its
/// record would land outside any benchmark directory.
pub fn persist_rules(
    storage: &dyn RuleStorage,
    rules: Vec<Rule>,
    existing_only: bool,
) -> Result<Vec<Rule>> {
    let mut written = Vec::with_capacity(rules.len());
    for rule in rules {
        let benchmark_id = rule.benchmark.id.clone();
        if benchmark_id.is_empty() {
            return Err(RulegenError::UnresolvedBenchmark {
                benchmark: rule.benchmark.name.clone(),
                rule_number: rule.rule_number.clone(),
            }
            .into());
        }
        if existing_only && !storage.rule_exists(&benchmark_id, &rule.rule_number) {
            tracing::debug!(rule = %rule.rule_number, "skipping rule without implementation");
            continue;
        }

        let existing = storage.load_rule(&benchmark_id, &rule.rule_number)?;
        let rule = merge_existing(rule, existing.as_ref());
        if rule.default_value.is_none() {
            tracing::warn!(
                benchmark = %benchmark_id,
                rule = %rule.rule_number,
                "rule has no default value, add it manually"
            );
        }
        storage.store_rule(&rule)?;
        written.push(rule);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BenchmarkInfo;

    fn rule(number: &str, id: &str, default_value: Option<&str>) -> Rule {
        Rule {
            id: id.to_string(),
            name: format!("Rule {number}"),
            rule_number: number.to_string(),
            profile_applicability: "* Level 1".to_string(),
            description: "desc".to_string(),
            rationale: String::new(),
            audit: String::new(),
            remediation: String::new(),
            impact: String::new(),
            default_value: default_value.map(str::to_string),
            references: vec!["https://a.example".to_string()],
            section: "Logging".to_string(),
            version: "1.0".to_string(),
            tags: vec!["CIS".to_string()],
            benchmark: BenchmarkInfo {
                name: "CIS Amazon Elastic Kubernetes Service (EKS)".to_string(),
                version: "v1.0.1".to_string(),
                id: "cis_eks".to_string(),
                rule_number: number.to_string(),
                posture_type: "kspm".to_string(),
            },
        }
    }

    fn temp_storage(name: &str) -> (PathBuf, FileStorage) {
        let root = std::env::temp_dir().join(format!("rulegen_storage_{name}_{}", std::process::id()));
        fs::remove_dir_all(&root).ok();
        let storage = FileStorage::new(
            root.join("rules").to_str().unwrap(),
            root.join("templates").to_str().unwrap(),
        )
        .unwrap();
        (root, storage)
    }

    #[test]
    fn persisted_id_and_default_value_win() {
        let existing = RuleDocument {
            metadata: rule("2.1.1", "old-id", Some("Disabled by default")),
        };
        let merged = merge_existing(rule("2.1.1", "new-id", None), Some(&existing));
        assert_eq!(merged.id, "old-id");
        assert_eq!(merged.default_value.as_deref(), Some("Disabled by default"));
    }

    #[test]
    fn blank_persisted_default_value_is_ignored() {
        let existing = RuleDocument {
            metadata: rule("2.1.1", "old-id", Some("  ")),
        };
        let merged = merge_existing(rule("2.1.1", "new-id", Some("fresh")), Some(&existing));
        assert_eq!(merged.default_value.as_deref(), Some("fresh"));
    }

    #[test]
    fn file_storage_roundtrip() {
        let (root, storage) = temp_storage("roundtrip");

        let original = rule("2.1.1", "id-1", Some("value"));
        storage.store_rule(&original).unwrap();
        assert!(storage.rule_exists("cis_eks", "2.1.1"));
        assert!(root.join("rules/cis_eks/rules/cis_2_1_1/data.yaml").is_file());

        let loaded = storage.load_rule("cis_eks", "2.1.1").unwrap().unwrap();
        assert_eq!(loaded.metadata, original);
        assert!(storage.load_rule("cis_eks", "9.9.9").unwrap().is_none());

        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn existing_only_skips_unimplemented_rules() {
        let (root, storage) = temp_storage("existing_only");
        storage.store_rule(&rule("2.1.1", "kept-id", Some("value"))).unwrap();

        let written = persist_rules(
            &storage,
            vec![rule("2.1.1", "fresh-id", None), rule("2.1.2", "other", None)],
            true,
        )
        .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].id, "kept-id");
        assert!(!storage.rule_exists("cis_eks", "2.1.2"));

        let listed = storage.list_rules("cis_eks").unwrap();
        assert_eq!(listed.len(), 1);

        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn templates_are_named_by_rule_id() {
        let (root, storage) = temp_storage("templates");
        let template = crate::migration::TemplateBuilder::default().migrate(&rule("2.1.1", "abc", None));
        storage.store_template(&template).unwrap();
        let text = fs::read_to_string(root.join("templates/abc.json")).unwrap();
        assert!(text.contains("\"rego_rule_id\": \"cis_2_1_1\""));

        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn records_without_top_level_rule_number_load() {
        let (root, storage) = temp_storage("legacy_record");
        let dir = root.join("rules/cis_k8s/rules/cis_1_1_1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("data.yaml"),
            "metadata:
  id: 1e4ae1f9-3dd1-5f6b-8ee5-63d52a1c7d56
  name: Ensure that the API server pod specification file permissions are set to
    600 or more restrictive
  profile_applicability: '* Level 1 - Master Node'
  description: Ensure that the API server pod specification file has permissions
    of `600` or more restrictive.
  rationale: ''
  audit: stat -c %a /etc/kubernetes/manifests/kube-apiserver.yaml
  remediation: chmod 600 /etc/kubernetes/manifests/kube-apiserver.yaml
  impact: None
  default_value: |
    By default, the `kube-apiserver.yaml` file has permissions of `640`.
  references: |-
    1. https://kubernetes.io/docs/admin/kube-apiserver/
  section: Master Node Configuration Files
  version: '1.0'
  tags:
  - CIS
  - Kubernetes
  - CIS 1.1.1
  - Master Node Configuration Files
  benchmark:
    name: CIS Kubernetes V1.23
    version: v1.0.1
    id: cis_k8s
    rule_number: 1.1.1
    posture_type: kspm
",
        )
        .unwrap();

        let loaded = storage.load_rule("cis_k8s", "1.1.1").unwrap().unwrap();
        assert_eq!(loaded.metadata.rule_number, "1.1.1");
        assert_eq!(
            loaded.metadata.references,
            ["https://kubernetes.io/docs/admin/kube-apiserver/"]
        );

        let listed = storage.list_rules("cis_k8s").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.package_name(), "cis_1_1_1");

        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn unresolved_benchmark_is_not_persisted() {
        let mut orphan = rule("1.1", "x", None);
        orphan.benchmark.id = String::new();
        orphan.benchmark.name = "CIS Oracle Database".to_string();

        let err = persist_rules(&NoOpStorage::new(), vec![orphan], false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RulegenError>(),
            Some(RulegenError::UnresolvedBenchmark { benchmark, .. }) if benchmark == "CIS Oracle Database"
        ));
    }

    #[test]
    fn noop_storage_writes_nothing() {
        let storage = NoOpStorage::new();
        let written = persist_rules(&storage, vec![rule("1.1", "x", None)], false).unwrap();
        assert_eq!(written.len(), 1);
        assert!(storage.list_rules("cis_eks").unwrap().is_empty());
    }
}
