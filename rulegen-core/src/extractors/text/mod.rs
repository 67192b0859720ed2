//! Positional-text rule extractor.
//!
//! ```text
//! pdf.js text items (per page)
//!     ↓ tokens_from_pages / group_lines
//! Lines (page-major, top-to-bottom)
//!     ↓ BlockScanner
//! RuleBlocks ("1.2.3 Title" … "CIS Controls:")
//!     ↓ parse_block
//! FieldMapping
//! ```

pub mod lines;

use crate::benchmarks::BenchmarkType;
use crate::config::TextExtractionConfig;
use crate::error::RulegenError;
use crate::types::{FieldMapping, Line, RuleBlock, Token};
use anyhow::Result;
use regex::Regex;

pub use lines::{build_line, group_lines, tokens_from_pages};

/// Scanner state while walking lines in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// No start-of-rule line seen yet
    NoActiveBlock,
    /// Collecting lines into the current block
    Open,
    /// End marker seen; lines are dropped until the next start line
    ClosedAwaitingNextStart,
}

/// Line-by-line block segmentation as an explicit state machine.
pub struct BlockScanner<'a> {
    start_of_rule: &'a Regex,
    end_of_rule: &'a Regex,
    state: BlockState,
    blocks: Vec<RuleBlock>,
}

impl<'a> BlockScanner<'a> {
    pub fn new(start_of_rule: &'a Regex, end_of_rule: &'a Regex) -> Self {
        Self {
            start_of_rule,
            end_of_rule,
            state: BlockState::NoActiveBlock,
            blocks: Vec::new(),
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn push(&mut self, line: Line) {
        if line_matches(&line, self.start_of_rule) {
            // A new start closes whatever is open
            self.blocks.push(RuleBlock {
                lines: vec![line],
                closed: false,
            });
            self.state = BlockState::Open;
            return;
        }

        match self.state {
            BlockState::Open => {
                let is_end = line_matches(&line, self.end_of_rule);
                if let Some(block) = self.blocks.last_mut() {
                    block.lines.push(line);
                    if is_end {
                        block.closed = true;
                        self.state = BlockState::ClosedAwaitingNextStart;
                    }
                }
            }
            BlockState::NoActiveBlock | BlockState::ClosedAwaitingNextStart => {}
        }
    }

    pub fn finish(self) -> Vec<RuleBlock> {
        self.blocks
    }
}

/// The assembled line text or any of its runs can carry the marker
fn line_matches(line: &Line, pattern: &Regex) -> bool {
    pattern.is_match(&line.text) || line.tokens.iter().any(|t| pattern.is_match(&t.text))
}

/// Segments positioned tokens of one benchmark document into rule blocks and
/// parses each block into its fields.
pub struct TextRuleExtractor {
    benchmark_type: BenchmarkType,
    y_cap: f64,
    property_key_font: Regex,
    property_key_suffix: Regex,
    end_of_rule: Regex,
}

impl TextRuleExtractor {
    pub fn new(benchmark_type: BenchmarkType, config: &TextExtractionConfig) -> Result<Self> {
        Ok(Self {
            benchmark_type,
            y_cap: config.y_cap,
            property_key_font: compile(&config.property_key_font)?,
            property_key_suffix: compile(&config.property_key_suffix)?,
            end_of_rule: compile(&config.end_of_rule_pattern)?,
        })
    }

    pub fn benchmark_type(&self) -> BenchmarkType {
        self.benchmark_type
    }

    /// Tokens → ordered lines
    pub fn lines(&self, tokens: &[Token]) -> Vec<Line> {
        group_lines(tokens, self.y_cap)
    }

    /// Lines → rule blocks, in document order
    pub fn group_blocks(&self, lines: Vec<Line>) -> Vec<RuleBlock> {
        let mut scanner = BlockScanner::new(self.benchmark_type.start_of_rule(), &self.end_of_rule);
        for line in lines {
            scanner.push(line);
        }
        scanner.finish()
    }

    /// Tokens → rule blocks
    pub fn extract(&self, tokens: &[Token]) -> Vec<RuleBlock> {
        let blocks = self.group_blocks(self.lines(tokens));
        tracing::info!(
            benchmark = %self.benchmark_type,
            blocks = blocks.len(),
            "segmented rule blocks"
        );
        blocks
    }

    /// A "Property:" line set in the property-key font
    pub fn is_property_key_line(&self, line: &Line) -> bool {
        self.property_key_suffix.is_match(&line.text)
            && line
                .first_font()
                .is_some_and(|font| self.property_key_font.is_match(font))
    }

    /// "Profile Applicability:" → "profile_applicability"
    pub fn property_key(line: &Line) -> String {
        line.text
            .to_lowercase()
            .replace(' ', "_")
            .replace(':', "")
    }

    /// Block → field mapping, including the header-derived `rule_number`,
    /// `name` and `section`. Fails when the rule's section is not in the
    /// benchmark taxonomy.
    pub fn parse_block(&self, block: &RuleBlock) -> Result<FieldMapping> {
        let start = self.benchmark_type.start_of_rule();
        let header_start = block
            .lines
            .iter()
            .position(|line| line_matches(line, start))
            .ok_or_else(|| RulegenError::MissingHeader(first_text(block)))?;
        let body_start = block.lines[header_start..]
            .iter()
            .position(|line| self.is_property_key_line(line))
            .map(|offset| header_start + offset)
            .unwrap_or(block.lines.len());

        let title = block.lines[header_start..body_start]
            .iter()
            .map(|line| line.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let (rule_number, name) = split_title(&title);
        if rule_number.is_empty() {
            return Err(RulegenError::MissingHeader(title).into());
        }
        let section = self.benchmark_type.section_for(&rule_number)?;

        let mut fields = self.parse_properties(&block.lines[body_start..]);
        tracing::debug!(
            rule = %rule_number,
            properties = fields.len(),
            "parsed rule block"
        );
        fields.insert("rule_number".to_string(), rule_number);
        fields.insert("name".to_string(), name);
        fields.insert("section".to_string(), section.to_string());
        Ok(fields)
    }

    /// Property lines open a field; every following line up to the next one
    /// becomes part of its value, one `\n` per line.
    fn parse_properties(&self, lines: &[Line]) -> FieldMapping {
        let mut fields = FieldMapping::new();
        let mut current: Option<(String, String)> = None;

        for line in lines {
            if self.is_property_key_line(line) {
                if let Some((key, value)) = current.take() {
                    fields.insert(key, value);
                }
                current = Some((Self::property_key(line), String::new()));
            } else if let Some((_, value)) = current.as_mut() {
                value.push_str(&line.text);
                value.push('\n');
            }
        }
        if let Some((key, value)) = current {
            fields.insert(key, value);
        }

        fields
    }
}

/// "1.2.3 Ensure that X" → ("1.2.3", "Ensure that X")
pub fn split_title(title: &str) -> (String, String) {
    let mut parts = title.split_whitespace();
    let number = parts.next().unwrap_or_default().to_string();
    let name = parts.collect::<Vec<_>>().join(" ");
    (number, name)
}

fn first_text(block: &RuleBlock) -> String {
    block
        .lines
        .first()
        .map(|line| line.text.clone())
        .unwrap_or_default()
}

fn compile(pattern: &str) -> Result<Regex, RulegenError> {
    Regex::new(pattern).map_err(|source| RulegenError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Profile applicability as written in the PDF ("• Level 1 - Master Node")
/// without bullets; several levels are joined as further list items.
pub fn profile_from_field(value: &str) -> String {
    value
        .lines()
        .map(|line| line.trim().trim_start_matches(['•', '*', '-', '●']).trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n* ")
}
