//! Static benchmark catalog.
//!
//! Per benchmark type: the section taxonomy (numeric prefix → title), the
//! pattern that opens a rule in the PDF text, and the default metadata used
//! when the caller does not supply one. All tables are built once and never
//! mutated.

use crate::error::RulegenError;
use crate::types::BenchmarkMetadata;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Benchmark families the positional-text extractor knows how to segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BenchmarkType {
    Kubernetes,
    Eks,
    Aws,
}

pub type SectionTaxonomy = HashMap<&'static str, &'static str>;

static KUBERNETES_SECTIONS: LazyLock<SectionTaxonomy> = LazyLock::new(|| {
    HashMap::from([
        ("1.1", "Master Node Configuration Files"),
        ("1.2", "API Server"),
        ("1.3", "Controller Manager"),
        ("1.4", "Scheduler"),
        ("2", "etcd"),
        ("3.1", "Authentication and Authorization"),
        ("3.2", "Logging"),
        ("4.1", "Worker Node Configuration Files"),
        ("4.2", "Kubelet"),
        ("5.1", "RBAC and Service Accounts"),
        ("5.2", "Pod Security Policies"),
        ("5.3", "Network Policies and CNI"),
        ("5.4", "Secrets Management"),
        ("5.5", "Extensible Admission Control"),
        ("5.7", "General Policies"),
    ])
});

static EKS_SECTIONS: LazyLock<SectionTaxonomy> = LazyLock::new(|| {
    HashMap::from([
        ("2.1", "Logging"),
        ("3.1", "Worker Node Configuration Files"),
        ("3.2", "Kubelet"),
        ("4.1", "RBAC and Service Accounts"),
        ("4.2", "Pod Security Policies"),
        ("4.3", "CNI Plugin"),
        ("4.4", "Secrets Management"),
        ("4.5", "Extensible Admission Control"),
        ("4.6", "General Policies"),
        ("5.1", "Image Registry and Image Scanning"),
        ("5.2", "Identity and Access Management (IAM)"),
        ("5.3", "AWS Key Management Service (KMS)"),
        ("5.4", "Cluster Networking"),
        ("5.5", "Authentication and Authorization"),
        ("5.6", "Other Cluster Configurations"),
    ])
});

static AWS_SECTIONS: LazyLock<SectionTaxonomy> = LazyLock::new(|| {
    HashMap::from([
        ("1", "Identity and Access Management"),
        ("2.1", "Simple Storage Service (S3)"),
        ("2.2", "Elastic Compute Cloud (EC2)"),
        ("2.3", "Relational Database Service (RDS)"),
        ("2.4", "Elastic File System (EFS)"),
        ("3", "Logging"),
        ("4", "Monitoring"),
        ("5", "Networking"),
    ])
});

// "1.2.3 Title"; Kubernetes etcd rules are two-level ("2.1 Title")
static START_OF_COMMON_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]\.[0-9]+\.[0-9]+ ").unwrap());

static START_OF_KUBERNETES_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]\.[0-9]+\.[0-9]+ |^2\.[0-9]+ ").unwrap());

static START_OF_AWS_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]\.[0-9]+(\.[0-9]+)? ").unwrap());

impl BenchmarkType {
    pub const ALL: [BenchmarkType; 3] = [Self::Kubernetes, Self::Eks, Self::Aws];

    pub fn sections(&self) -> &'static SectionTaxonomy {
        match self {
            Self::Kubernetes => &KUBERNETES_SECTIONS,
            Self::Eks => &EKS_SECTIONS,
            Self::Aws => &AWS_SECTIONS,
        }
    }

    pub fn start_of_rule(&self) -> &'static Regex {
        match self {
            Self::Kubernetes => &START_OF_KUBERNETES_RULE,
            Self::Eks => &START_OF_COMMON_RULE,
            Self::Aws => &START_OF_AWS_RULE,
        }
    }

    /// Short id used for rule directories, e.g. `cis_k8s`
    pub fn id(&self) -> &'static str {
        match self {
            Self::Kubernetes => "cis_k8s",
            Self::Eks => "cis_eks",
            Self::Aws => "cis_aws",
        }
    }

    /// Metadata of the benchmark edition the taxonomy was written against
    pub fn default_metadata(&self) -> BenchmarkMetadata {
        let (name, version) = match self {
            Self::Kubernetes => ("CIS Kubernetes V1.20", "v1.0.0"),
            Self::Eks => (
                "CIS Amazon Elastic Kubernetes Service (EKS) Benchmark",
                "v1.0.1",
            ),
            Self::Aws => ("CIS Amazon Web Services Foundations", "v1.5.0"),
        };
        BenchmarkMetadata {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// Section title for a full rule number ("1.2.3" looks up "1.2")
    pub fn section_for(&self, rule_number: &str) -> Result<&'static str, RulegenError> {
        let prefix = section_prefix(rule_number);
        self.sections()
            .get(prefix)
            .copied()
            .ok_or_else(|| RulegenError::SectionNotFound {
                benchmark: self.to_string(),
                rule_number: rule_number.to_string(),
                prefix: prefix.to_string(),
            })
    }
}

/// Rule number up to (not including) its last '.'
pub fn section_prefix(rule_number: &str) -> &str {
    rule_number
        .rfind('.')
        .map(|idx| &rule_number[..idx])
        .unwrap_or("")
}

impl fmt::Display for BenchmarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Kubernetes => "Kubernetes",
            Self::Eks => "EKS",
            Self::Aws => "AWS",
        };
        f.write_str(name)
    }
}

impl FromStr for BenchmarkType {
    type Err = RulegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kubernetes" | "k8s" | "cis_k8s" => Ok(Self::Kubernetes),
            "eks" | "cis_eks" => Ok(Self::Eks),
            "aws" | "cis_aws" => Ok(Self::Aws),
            _ => Err(RulegenError::UnknownBenchmarkType(s.to_string())),
        }
    }
}

/// Tag, short id and posture type derived from a benchmark display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchmarkKind {
    pub tag: String,
    pub id: String,
    pub posture_type: String,
}

const KSPM_POSTURE_TYPE: &str = "kspm";
const CSPM_POSTURE_TYPE: &str = "cspm";

// Order matters: the EKS title also contains "Kubernetes".
const KNOWN_BENCHMARKS: &[(&str, &str, &str, &str)] = &[
    ("Elastic Kubernetes Service", "EKS", "cis_eks", KSPM_POSTURE_TYPE),
    ("EKS", "EKS", "cis_eks", KSPM_POSTURE_TYPE),
    ("Kubernetes", "Kubernetes", "cis_k8s", KSPM_POSTURE_TYPE),
    ("Amazon Web Services", "AWS", "cis_aws", CSPM_POSTURE_TYPE),
    ("Google Cloud Platform", "GCP", "cis_gcp", CSPM_POSTURE_TYPE),
    ("Microsoft Azure", "AZURE", "cis_azure", CSPM_POSTURE_TYPE),
];

/// First known benchmark whose marker appears in `name`; empty when none does.
pub fn resolve_benchmark_kind(name: &str) -> BenchmarkKind {
    KNOWN_BENCHMARKS
        .iter()
        .find(|(needle, ..)| name.contains(needle))
        .map(|(_, tag, id, posture)| BenchmarkKind {
            tag: tag.to_string(),
            id: id.to_string(),
            posture_type: posture.to_string(),
        })
        .unwrap_or_default()
}

/// Split `<Name_Parts>_Benchmark_<version>` (extension already removed)
pub fn metadata_from_file_stem(stem: &str) -> Result<BenchmarkMetadata, RulegenError> {
    let tokens: Vec<&str> = stem.split('_').collect();
    let pivot = tokens
        .iter()
        .position(|t| *t == "Benchmark")
        .ok_or_else(|| RulegenError::MalformedBenchmarkFileName(stem.to_string()))?;
    let version = tokens
        .last()
        .filter(|_| pivot + 1 < tokens.len())
        .ok_or_else(|| RulegenError::MalformedBenchmarkFileName(stem.to_string()))?;

    Ok(BenchmarkMetadata {
        name: tokens[..pivot].join(" "),
        version: version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubernetes_section_lookup_uses_prefix_before_last_dot() {
        assert_eq!(BenchmarkType::Kubernetes.section_for("1.2.3").unwrap(), "API Server");
        assert_eq!(BenchmarkType::Kubernetes.section_for("2.4").unwrap(), "etcd");
    }

    #[test]
    fn missing_section_is_an_error() {
        let err = BenchmarkType::Eks.section_for("9.9.9").unwrap_err();
        assert!(matches!(err, RulegenError::SectionNotFound { ref prefix, .. } if prefix == "9.9"));
    }

    #[test]
    fn start_patterns_per_type() {
        assert!(BenchmarkType::Kubernetes.start_of_rule().is_match("2.1 Ensure etcd"));
        assert!(!BenchmarkType::Eks.start_of_rule().is_match("2.1 Ensure"));
        assert!(BenchmarkType::Eks.start_of_rule().is_match("3.1.1 Ensure"));
        assert!(BenchmarkType::Aws.start_of_rule().is_match("1.10 Ensure MFA"));
        assert!(!BenchmarkType::Aws.start_of_rule().is_match("1. Login to the console"));
    }

    #[test]
    fn benchmark_type_parses_common_spellings() {
        assert_eq!("k8s".parse::<BenchmarkType>().unwrap(), BenchmarkType::Kubernetes);
        assert_eq!("cis_eks".parse::<BenchmarkType>().unwrap(), BenchmarkType::Eks);
        assert_eq!("AWS".parse::<BenchmarkType>().unwrap(), BenchmarkType::Aws);
        assert!("gke".parse::<BenchmarkType>().is_err());
        for benchmark_type in BenchmarkType::ALL {
            assert_eq!(benchmark_type.id().parse::<BenchmarkType>().unwrap(), benchmark_type);
        }
    }

    #[test]
    fn eks_name_resolves_before_kubernetes() {
        let kind = resolve_benchmark_kind("CIS Amazon Elastic Kubernetes Service (EKS)");
        assert_eq!(kind.tag, "EKS");
        assert_eq!(kind.id, "cis_eks");

        let kind = resolve_benchmark_kind("CIS Kubernetes V1.23");
        assert_eq!(kind.tag, "Kubernetes");
        assert_eq!(kind.posture_type, "kspm");
    }

    #[test]
    fn unknown_benchmark_name_yields_empty_kind() {
        assert_eq!(resolve_benchmark_kind("CIS Oracle Database"), BenchmarkKind::default());
    }

    #[test]
    fn file_stem_splits_on_benchmark_token() {
        let meta =
            metadata_from_file_stem("CIS_Amazon_Web_Services_Foundations_Benchmark_v1.5.0").unwrap();
        assert_eq!(meta.name, "CIS Amazon Web Services Foundations");
        assert_eq!(meta.version, "v1.5.0");

        assert!(metadata_from_file_stem("CIS_Kubernetes_v1.0.0").is_err());
        assert!(metadata_from_file_stem("CIS_Kubernetes_Benchmark").is_err());
    }
}
