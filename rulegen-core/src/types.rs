use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// ===== RAW INPUT TYPES =====
// These mirror what the decoding collaborators hand us: pdf.js text items
// for PDFs and string grids for spreadsheets.

/// One positioned text fragment on a PDF page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "str")]
    pub text: String,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(rename = "fontName", default)]
    pub font_name: String,
    /// Affine transform `[a, b, c, d, e, f]`; `e` is x, `f` is y
    #[serde(default)]
    pub transform: [f64; 6],
    /// 1-indexed page, assigned when pages are flattened
    #[serde(default)]
    pub page: u32,
}

impl Token {
    pub fn x(&self) -> f64 {
        self.transform[4]
    }

    pub fn y(&self) -> f64 {
        self.transform[5]
    }

    /// Right edge of the fragment on the x axis
    pub fn end_x(&self) -> f64 {
        self.transform[4] + self.width
    }

    /// Zero-sized or empty items are header/footer and layout artifacts
    pub fn is_visible(&self) -> bool {
        self.width != 0.0 && self.height != 0.0 && !self.text.is_empty()
    }
}

/// A labeled sheet of string cells; `data[0]` is the header row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(deserialize_with = "deserialize_cells", default)]
    pub data: Vec<Vec<String>>,
}

/// Spreadsheet dumps carry nulls and numbers next to strings. Numbers keep
/// their source text, so a rule numbered `1.10` is not read back as `1.1`.
fn deserialize_cells<'de, D>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Vec<Vec<serde_json::Value>> = Deserialize::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect()
        })
        .collect())
}

// ===== INTERMEDIATE TYPES =====

/// Tokens that share a page and a baseline, joined into text.
#[derive(Debug, Clone, Serialize)]
pub struct Line {
    pub page: u32,
    pub y: f64,
    pub tokens: Vec<Token>,
    pub text: String,
}

impl Line {
    pub fn first_font(&self) -> Option<&str> {
        self.tokens.first().map(|t| t.font_name.as_str())
    }
}

/// The contiguous run of lines that describes one benchmark rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleBlock {
    pub lines: Vec<Line>,
    /// Whether the end-of-rule marker was seen
    pub closed: bool,
}

/// Canonical field name → raw field text
pub type FieldMapping = BTreeMap<String, String>;

// ===== OUTPUT TYPES =====

/// Benchmark identity as it comes from the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    pub name: String,
    pub version: String,
}

/// Benchmark block embedded in every rule record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkInfo {
    pub name: String,
    pub version: String,
    /// Short benchmark id, e.g. `cis_k8s`
    pub id: String,
    #[serde(default)]
    pub rule_number: String,
    #[serde(default)]
    pub posture_type: String,
}

/// Canonical rule record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    /// Older records only carry it as `benchmark.rule_number`
    #[serde(default)]
    pub rule_number: String,
    pub profile_applicability: String,
    pub description: String,
    pub rationale: String,
    pub audit: String,
    pub remediation: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default, deserialize_with = "deserialize_references")]
    pub references: Vec<String>,
    pub section: String,
    #[serde(default = "default_rule_version")]
    pub version: String,
    pub tags: Vec<String>,
    pub benchmark: BenchmarkInfo,
}

pub const RULE_VERSION: &str = "1.0";

fn default_rule_version() -> String {
    RULE_VERSION.to_string()
}

/// Older records stored references as one enumerated string
fn deserialize_references<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum References {
        List(Vec<String>),
        Text(String),
        Missing(()),
    }

    Ok(match References::deserialize(deserializer)? {
        References::List(list) => list,
        References::Text(text) => crate::normalizer::parse_references(&text),
        References::Missing(()) => Vec::new(),
    })
}

/// On-disk wrapper of a rule record (`data.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub metadata: Rule,
}

impl Rule {
    /// Directory/package name of the rule, e.g. `cis_1_2_3`
    pub fn package_name(&self) -> String {
        rule_package_name(&self.rule_number)
    }
}

pub fn rule_package_name(rule_number: &str) -> String {
    format!("cis_{}", rule_number.replace('.', "_"))
}

/// Rules picked on the command line, as `1.2.3` or `cis_1_2_3`. Empty
/// selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSelection {
    rule_numbers: Vec<String>,
}

impl RuleSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rule_numbers = rules
            .into_iter()
            .map(|rule| {
                let rule = rule.as_ref().trim();
                match rule.strip_prefix("cis_") {
                    Some(package) => package.replace('_', "."),
                    None => rule.to_string(),
                }
            })
            .filter(|rule| !rule.is_empty())
            .collect();
        Self { rule_numbers }
    }

    pub fn is_all(&self) -> bool {
        self.rule_numbers.is_empty()
    }

    pub fn contains(&self, rule_number: &str) -> bool {
        self.is_all() || self.rule_numbers.iter().any(|r| r == rule_number)
    }
}
