//! Tabular rule extractor for benchmark workbooks.
//!
//! Each "Level …" sheet has a header row and one row per section or rule.
//! Section rows (`section #` + `title`, no `recommendation #`) name the
//! sections; rule rows carry a `recommendation #` and point at a section by
//! number.

use crate::error::RulegenError;
use crate::normalizer::RuleNormalizer;
use crate::types::{BenchmarkMetadata, FieldMapping, Rule, Sheet};
use anyhow::Result;
use std::collections::{HashMap, HashSet};

const SECTION_COLUMN: &str = "section #";
const TITLE_COLUMN: &str = "title";
const RECOMMENDATION_COLUMN: &str = "recommendation #";

/// Canonical field ← source columns, first non-empty wins
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("name", &["title"]),
    ("rule_number", &["recommendation #"]),
    ("description", &["description"]),
    ("rationale", &["rational statement", "rationale statement"]),
    ("audit", &["audit procedure"]),
    ("remediation", &["remediation procedure"]),
    ("impact", &["impact statement"]),
    ("default_value", &["default value"]),
    ("references", &["references"]),
];

/// Section number → section title, collected from section-header rows
pub type SectionTable = HashMap<String, String>;

pub struct TabularRuleExtractor<'a> {
    normalizer: &'a RuleNormalizer,
    sheet_prefix: String,
}

impl<'a> TabularRuleExtractor<'a> {
    pub fn new(normalizer: &'a RuleNormalizer, sheet_prefix: &str) -> Self {
        Self {
            normalizer,
            sheet_prefix: sheet_prefix.to_string(),
        }
    }

    /// Whether a sheet takes part in extraction at all
    pub fn is_rule_sheet(&self, sheet: &Sheet) -> bool {
        sheet.name.starts_with(&self.sheet_prefix)
    }

    /// Rules of one sheet, resolving sections against the sheet's own rows.
    /// Non-rule sheets yield nothing.
    pub fn extract(&self, sheet: &Sheet, benchmark: &BenchmarkMetadata) -> Result<Vec<Rule>> {
        if !self.is_rule_sheet(sheet) {
            return Ok(Vec::new());
        }
        let rows = sheet_rows(sheet);
        let sections = collect_sections(&rows);
        self.rules_from_rows(&sheet.name, &rows, &sections, benchmark)
    }

    /// Rules of every rule sheet. Sections are collected across all rule
    /// sheets first; a rule number seen on an earlier sheet is not repeated.
    pub fn extract_workbook(
        &self,
        sheets: &[Sheet],
        benchmark: &BenchmarkMetadata,
    ) -> Result<Vec<Rule>> {
        let selected: Vec<(&Sheet, Vec<FieldMapping>)> = sheets
            .iter()
            .filter(|sheet| self.is_rule_sheet(sheet))
            .map(|sheet| (sheet, sheet_rows(sheet)))
            .collect();

        let mut sections = SectionTable::new();
        for (_, rows) in &selected {
            for (number, title) in collect_sections(rows) {
                sections.entry(number).or_insert(title);
            }
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::new();
        for (sheet, rows) in &selected {
            let sheet_rules = self.rules_from_rows(&sheet.name, rows, &sections, benchmark)?;
            tracing::info!(sheet = %sheet.name, rules = sheet_rules.len(), "parsed sheet");
            rules.extend(
                sheet_rules
                    .into_iter()
                    .filter(|rule| seen.insert(rule.rule_number.clone())),
            );
        }
        Ok(rules)
    }

    fn rules_from_rows(
        &self,
        profile_applicability: &str,
        rows: &[FieldMapping],
        sections: &SectionTable,
        benchmark: &BenchmarkMetadata,
    ) -> Result<Vec<Rule>> {
        rows.iter()
            .filter(|row| !cell(row, RECOMMENDATION_COLUMN).is_empty())
            .map(|row| {
                let fields = canonical_fields(row, sections)?;
                let rule = self.normalizer.normalize(&fields, benchmark, profile_applicability);
                tracing::debug!(rule = %rule.rule_number, name = %rule.name, "parsed rule row");
                Ok::<_, anyhow::Error>(rule)
            })
            .collect()
    }
}

/// Header-keyed rows; headers are lowercased, `\r\n` becomes `\n`, missing
/// trailing cells are empty.
pub fn sheet_rows(sheet: &Sheet) -> Vec<FieldMapping> {
    let Some((header, data)) = sheet.data.split_first() else {
        return Vec::new();
    };
    let keys: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();

    data.iter()
        .map(|values| {
            keys.iter()
                .enumerate()
                .map(|(idx, key)| {
                    let value = values
                        .get(idx)
                        .map(|v| v.replace("\r\n", "\n"))
                        .unwrap_or_default();
                    (key.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Section-header rows → section table. A repeated section number keeps
/// its first title.
pub fn collect_sections(rows: &[FieldMapping]) -> SectionTable {
    let mut sections = SectionTable::new();
    for row in rows {
        let number = cell(row, SECTION_COLUMN);
        let title = cell(row, TITLE_COLUMN);
        if number.is_empty() || title.is_empty() || !cell(row, RECOMMENDATION_COLUMN).is_empty() {
            continue;
        }
        sections
            .entry(number.to_string())
            .or_insert_with(|| title.to_string());
    }
    sections
}

/// Rule row → canonical field names, with `section` resolved. A section
/// number without a header row is fatal.
fn canonical_fields(row: &FieldMapping, sections: &SectionTable) -> Result<FieldMapping> {
    let mut fields = FieldMapping::new();
    for (field, columns) in COLUMN_ALIASES {
        let value = columns
            .iter()
            .map(|column| cell(row, column))
            .find(|value| !value.is_empty())
            .unwrap_or_default();
        fields.insert(field.to_string(), value.to_string());
    }

    let section_number = cell(row, SECTION_COLUMN);
    let section = sections
        .get(section_number)
        .ok_or_else(|| RulegenError::SectionRowNotFound {
            rule_number: cell(row, RECOMMENDATION_COLUMN).to_string(),
            section: section_number.to_string(),
        })?;
    fields.insert("section".to_string(), section.clone());

    Ok(fields)
}

fn cell<'r>(row: &'r FieldMapping, column: &str) -> &'r str {
    row.get(column).map(String::as_str).unwrap_or_default()
}
