use crate::benchmarks::BenchmarkType;
use crate::config::GeneratorConfig;
use crate::extractors::tabular::TabularRuleExtractor;
use crate::extractors::text::{profile_from_field, tokens_from_pages, TextRuleExtractor};
use crate::migration::TemplateBuilder;
use crate::normalizer::RuleNormalizer;
use crate::references::{ReferenceChecker, ReferenceValidator};
use crate::report::{missing_rules, MissingRule};
use crate::storage::{persist_rules, RuleStorage};
use crate::types::*;
use anyhow::Result;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Captured intermediate outputs from each pipeline stage
/// Used for testing and diagnostics — lets you inspect/compare each boundary
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStages {
    pub lines: Vec<Line>,
    pub blocks: Vec<RuleBlock>,
    pub fields: Vec<FieldMapping>,
    pub rules: Vec<Rule>,
}

/// Counts of one run, written next to the stage dumps
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub benchmark: String,
    pub benchmark_version: String,
    pub rules_extracted: usize,
    pub rules_selected: usize,
    /// Selected rules that had no persisted record before this run
    pub missing_rules: Vec<MissingRule>,
    pub references_dropped: usize,
    pub rules_written: usize,
    pub templates_written: usize,
}

/// Simple profiler that collects timings for pipeline steps
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        self.timings.push((step_name.to_string(), elapsed));
        println!("⏱️  {}: {:.0}ms", step_name, elapsed.as_millis());

        result
    }

    pub fn timings(&self) -> &[(String, Duration)] {
        &self.timings
    }

    pub fn print_summary(&self) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        println!("\n📊 Performance Summary:");
        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();

        for (step, duration) in &self.timings {
            let percentage = if total.is_zero() {
                0.0
            } else {
                (duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            };
            println!(
                "   {:.<35} {:.0}ms ({:.1}%)",
                step,
                duration.as_millis(),
                percentage
            );
        }
        println!("   {:.<35} {:.0}ms", "Total", total.as_millis());
    }
}

pub struct BenchmarkProcessor {
    config: GeneratorConfig,
    normalizer: RuleNormalizer,
    templates: TemplateBuilder,
    storage: Box<dyn RuleStorage + Send + Sync>,
    reference_checker: Option<Box<dyn ReferenceChecker>>,
}

impl BenchmarkProcessor {
    /// Create BenchmarkProcessor with full dependency injection
    pub fn new_with_dependencies(
        config: GeneratorConfig,
        storage: Box<dyn RuleStorage + Send + Sync>,
    ) -> Self {
        Self {
            normalizer: RuleNormalizer::new(config.namespace),
            templates: TemplateBuilder::new(config.template.clone()),
            config,
            storage,
            reference_checker: None,
        }
    }

    /// Links are only checked when a checker is installed and checks are
    /// enabled in the config
    pub fn with_reference_checker(mut self, checker: Box<dyn ReferenceChecker>) -> Self {
        self.reference_checker = Some(checker);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Stage 1 for PDFs: pages of tokens → rules, keeping every boundary
    pub fn extract_pdf_rules(
        &self,
        pages: Vec<Vec<Token>>,
        benchmark_type: BenchmarkType,
        benchmark: &BenchmarkMetadata,
        profiler: &mut StepProfiler,
    ) -> Result<PipelineStages> {
        let text_config = &self.config.text_extraction;
        let extractor = TextRuleExtractor::new(benchmark_type, text_config)?;

        let lines = profiler.time_step("1. Tokens → Lines", || {
            let tokens = tokens_from_pages(pages, text_config.page_header_items);
            extractor.lines(&tokens)
        });
        println!("📋 {} lines", lines.len());

        let blocks = profiler.time_step("2. Lines → Rule Blocks", || {
            extractor.group_blocks(lines.clone())
        });
        println!("📋 {} rule blocks", blocks.len());

        let fields = profiler.time_step("3. Rule Blocks → Fields", || {
            blocks
                .iter()
                .map(|block| extractor.parse_block(block))
                .collect::<Result<Vec<_>>>()
        })?;

        let rules = profiler.time_step("4. Fields → Rules", || {
            fields
                .iter()
                .map(|fields| {
                    let profile = fields
                        .get("profile_applicability")
                        .map(|value| profile_from_field(value))
                        .unwrap_or_default();
                    self.normalizer.normalize(fields, benchmark, &profile)
                })
                .collect::<Vec<_>>()
        });
        tracing::info!(benchmark = %benchmark.name, rules = rules.len(), "extracted rules from text");

        Ok(PipelineStages {
            lines,
            blocks,
            fields,
            rules,
        })
    }

    /// Stage 1 for spreadsheets: workbook sheets → rules
    pub fn extract_spreadsheet_rules(
        &self,
        sheets: &[Sheet],
        benchmark: &BenchmarkMetadata,
        profiler: &mut StepProfiler,
    ) -> Result<Vec<Rule>> {
        let extractor = TabularRuleExtractor::new(&self.normalizer, &self.config.tabular.sheet_prefix);
        let rules = profiler.time_step("1. Sheets → Rules", || {
            extractor.extract_workbook(sheets, benchmark)
        })?;
        tracing::info!(benchmark = %benchmark.name, rules = rules.len(), "extracted rules from workbook");
        Ok(rules)
    }

    /// Stage 2: select, validate references, persist records and templates
    pub fn publish(
        &self,
        rules: Vec<Rule>,
        selection: &RuleSelection,
        profiler: &mut StepProfiler,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            rules_extracted: rules.len(),
            ..RunSummary::default()
        };
        if let Some(first) = rules.first() {
            summary.benchmark = first.benchmark.name.clone();
            summary.benchmark_version = first.benchmark.version.clone();
        }

        let mut selected: Vec<Rule> = rules
            .into_iter()
            .filter(|rule| selection.contains(&rule.rule_number))
            .collect();
        summary.rules_selected = selected.len();
        summary.missing_rules = missing_rules(self.storage.as_ref(), &selected);

        if let Some(checker) = self.active_reference_checker() {
            let before: usize = selected.iter().map(|r| r.references.len()).sum();
            profiler.time_step("5. Reference Validation", || {
                ReferenceValidator::new(checker, self.config.references.max_concurrent_checks)
                    .validate_rules(&mut selected)
            })?;
            let after: usize = selected.iter().map(|r| r.references.len()).sum();
            summary.references_dropped = before - after;
        }

        let written = profiler.time_step("6. Persist Rules", || {
            persist_rules(
                self.storage.as_ref(),
                selected,
                self.config.output.existing_rules_only,
            )
        })?;
        summary.rules_written = written.len();
        println!("💾 Wrote {} rule records", written.len());

        if self.config.output.write_templates {
            summary.templates_written = profiler.time_step("7. Templates", || {
                written.iter().try_fold(0, |count, rule| {
                    self.storage.store_template(&self.templates.migrate(rule))?;
                    Ok::<usize, anyhow::Error>(count + 1)
                })
            })?;
            println!("💾 Wrote {} rule templates", summary.templates_written);
        }

        Ok(summary)
    }

    fn active_reference_checker(&self) -> Option<&dyn ReferenceChecker> {
        if !self.config.references.enabled {
            return None;
        }
        let checker = self.reference_checker.as_deref();
        if checker.is_none() {
            tracing::warn!("reference checks enabled but no checker installed, skipping");
        }
        checker
    }

    /// Positional-text benchmark end to end
    pub fn process_pdf(
        &self,
        pages: Vec<Vec<Token>>,
        benchmark_type: BenchmarkType,
        benchmark: &BenchmarkMetadata,
        selection: &RuleSelection,
        enable_profiling: bool,
    ) -> Result<(PipelineStages, RunSummary)> {
        let start_time = Instant::now();
        let mut profiler = StepProfiler::new(enable_profiling);
        println!("📄 Processing {} benchmark: {}", benchmark_type, benchmark.name);

        let stages = self.extract_pdf_rules(pages, benchmark_type, benchmark, &mut profiler)?;
        let summary = self.publish(stages.rules.clone(), selection, &mut profiler)?;

        profiler.print_summary();
        println!(
            "⏱️  Total processing time: {:.3}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok((stages, summary))
    }

    /// Spreadsheet benchmark end to end
    pub fn process_spreadsheet(
        &self,
        sheets: &[Sheet],
        benchmark: &BenchmarkMetadata,
        selection: &RuleSelection,
        enable_profiling: bool,
    ) -> Result<(PipelineStages, RunSummary)> {
        let start_time = Instant::now();
        let mut profiler = StepProfiler::new(enable_profiling);
        println!("📄 Processing workbook: {}", benchmark.name);

        let rules = self.extract_spreadsheet_rules(sheets, benchmark, &mut profiler)?;
        let summary = self.publish(rules.clone(), selection, &mut profiler)?;

        profiler.print_summary();
        println!(
            "⏱️  Total processing time: {:.3}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok((
            PipelineStages {
                rules,
                ..PipelineStages::default()
            },
            summary,
        ))
    }

    /// Re-emit templates for records already on disk
    pub fn generate_templates(&self, benchmark_id: &str, selection: &RuleSelection) -> Result<usize> {
        let documents = self.storage.list_rules(benchmark_id)?;
        let mut count = 0;
        for document in documents
            .iter()
            .filter(|doc| selection.contains(&doc.metadata.rule_number))
        {
            self.storage
                .store_template(&self.templates.migrate_document(document))?;
            count += 1;
        }
        println!("✅ Processed {} rules for {} benchmark", count, benchmark_id);
        Ok(count)
    }
}
