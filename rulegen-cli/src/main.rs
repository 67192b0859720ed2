use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Import from rulegen-core
use rulegen_core::benchmarks::metadata_from_file_stem;
use rulegen_core::report::write_missing_rules;
use rulegen_core::{
    BenchmarkMetadata, BenchmarkProcessor, BenchmarkType, FileStorage, GeneratorConfig,
    PipelineStages, RuleSelection, RunSummary, Sheet, Token,
};

// Import CLI utilities
use rulegen_cli::HttpLinkChecker;

#[derive(Parser)]
#[command(name = "rulegen")]
#[command(about = "Generate CIS rule records and rule templates from benchmark documents")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(ClapArgs)]
struct CommonArgs {
    /// Path to custom config file (YAML format)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Root directory of rule records (<benchmark id>/rules/cis_x_y_z/data.yaml)
    #[arg(long, global = true)]
    rules_dir: Option<String>,

    /// Directory for rule template JSON files
    #[arg(long, global = true)]
    templates_dir: Option<String>,

    /// Only regenerate rules that already have a package directory
    #[arg(long, global = true)]
    existing_rules_only: bool,

    /// Do not write rule templates next to the records
    #[arg(long, global = true)]
    no_templates: bool,

    /// HEAD-check every reference URL and drop the ones that do not answer 200
    #[arg(long, global = true)]
    check_references: bool,

    /// Specific rules to process, as 1.2.3 or cis_1_2_3 (default: all rules)
    #[arg(short, long, global = true, num_args = 1..)]
    rules: Vec<String>,

    /// Enable detailed profiling of all pipeline steps
    #[arg(long, global = true)]
    profile: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Extract rules from positioned PDF text (pdf.js text items as JSON)
    Pdf {
        /// JSON array of pages, each an array of pdf.js text items
        #[arg(short, long)]
        input: String,

        /// Benchmark type: kubernetes, eks or aws
        #[arg(short, long)]
        benchmark: BenchmarkType,

        /// Benchmark display name (default: derived from the input file name)
        #[arg(long)]
        name: Option<String>,

        /// Benchmark version (default: derived from the input file name)
        #[arg(long)]
        version: Option<String>,

        #[command(flatten)]
        output: RunOutputArgs,
    },

    /// Extract rules from a benchmark workbook (sheets as JSON)
    Spreadsheet {
        /// <Benchmark_Name>_Benchmark_<version>.json with an array of sheets
        #[arg(short, long)]
        input: String,

        #[command(flatten)]
        output: RunOutputArgs,
    },

    /// Regenerate rule templates from the records already on disk
    Templates {
        /// Benchmark ids, e.g. cis_k8s (default: all benchmarks)
        #[arg(short, long, num_args = 1..)]
        benchmark: Vec<String>,
    },
}

#[derive(ClapArgs)]
struct RunOutputArgs {
    /// Write a CSV (number,name) of rules that had no record yet
    #[arg(long)]
    missing_report: Option<String>,

    /// Dump all intermediate pipeline stage outputs to a directory
    /// Captures: lines, rule blocks, field mappings and rules as separate files
    #[arg(long)]
    dump_stages: bool,

    /// Directory for stage dump output (default: test_outputs/stages)
    #[arg(long, default_value = "test_outputs/stages")]
    stages_dir: String,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    println!("🦀 CIS Rule Generator");

    if let Err(e) = run(args) {
        eprintln!("❌ Processing failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args.common);
    let selection = RuleSelection::new(&args.common.rules);
    let processor = create_processor(&config)?;
    tracing::debug!(
        rules_dir = %config.output.rules_dir,
        templates_dir = %config.output.templates_dir,
        "resolved output directories"
    );

    match args.command {
        Command::Pdf {
            input,
            benchmark,
            name,
            version,
            output,
        } => {
            let pages: Vec<Vec<Token>> = read_json(&input)?;
            let metadata = pdf_metadata(&input, benchmark, name, version);
            let (stages, summary) = processor.process_pdf(
                pages,
                benchmark,
                &metadata,
                &selection,
                args.common.profile,
            )?;
            finish_run(&stages, &summary, &output)
        }
        Command::Spreadsheet { input, output } => {
            let sheets: Vec<Sheet> = read_json(&input)?;
            let metadata = metadata_from_file_stem(file_stem(&input))?;
            let (stages, summary) =
                processor.process_spreadsheet(&sheets, &metadata, &selection, args.common.profile)?;
            finish_run(&stages, &summary, &output)
        }
        Command::Templates { benchmark } => {
            let benchmarks = if benchmark.is_empty() {
                BenchmarkType::ALL.iter().map(|b| b.id().to_string()).collect()
            } else {
                benchmark
            };
            for benchmark_id in &benchmarks {
                println!("### Processing {}", benchmark_id.replace('_', " ").to_uppercase());
                processor.generate_templates(benchmark_id, &selection)?;
            }
            Ok(())
        }
    }
}

/// Config file (or defaults) with CLI overrides applied
fn load_config(args: &CommonArgs) -> GeneratorConfig {
    let mut config = GeneratorConfig::load_with_fallback(args.config.as_deref());

    if let Some(config_path) = &args.config {
        println!("📋 Loaded config from: {}", config_path);
    } else {
        println!("📋 Using default config");
    }

    // Apply CLI overrides to config
    if let Some(rules_dir) = &args.rules_dir {
        config.output.rules_dir = rules_dir.clone();
    }
    if let Some(templates_dir) = &args.templates_dir {
        config.output.templates_dir = templates_dir.clone();
    }
    if args.existing_rules_only {
        config.output.existing_rules_only = true;
    }
    if args.no_templates {
        config.output.write_templates = false;
    }
    if args.check_references {
        config.references.enabled = true;
    }
    config
}

fn create_processor(config: &GeneratorConfig) -> Result<BenchmarkProcessor> {
    let storage = FileStorage::new(&config.output.rules_dir, &config.output.templates_dir)?;
    let processor = BenchmarkProcessor::new_with_dependencies(config.clone(), Box::new(storage));

    if config.references.enabled {
        let timeout = Duration::from_secs(config.references.timeout_secs);
        println!("🔗 Checking reference links ({}s timeout)", timeout.as_secs());
        return Ok(processor.with_reference_checker(Box::new(HttpLinkChecker::new(timeout))));
    }
    Ok(processor)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening input {path}"))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("parsing input {path}"))
}

fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

/// Explicit flags win, then the file name, then the type's default edition
fn pdf_metadata(
    input: &str,
    benchmark: BenchmarkType,
    name: Option<String>,
    version: Option<String>,
) -> BenchmarkMetadata {
    let base = metadata_from_file_stem(file_stem(input))
        .unwrap_or_else(|_| benchmark.default_metadata());
    BenchmarkMetadata {
        name: name.unwrap_or(base.name),
        version: version.unwrap_or(base.version),
    }
}

fn finish_run(stages: &PipelineStages, summary: &RunSummary, output: &RunOutputArgs) -> Result<()> {
    println!("✅ Successfully processed benchmark");
    println!("📊 Run metrics:");
    println!("   - Rules extracted: {}", summary.rules_extracted);
    println!("   - Rules selected: {}", summary.rules_selected);
    println!("   - Rules without record: {}", summary.missing_rules.len());
    println!("   - References dropped: {}", summary.references_dropped);

    if let Some(report_path) = &output.missing_report {
        let file = File::create(report_path).with_context(|| format!("creating {report_path}"))?;
        write_missing_rules(file, &summary.missing_rules)?;
        println!("💾 Missing rules report saved to: {}", report_path);
    }

    if output.dump_stages {
        println!("\n🔬 Pipeline stage dump mode");
        save_stages(stages, summary, &output.stages_dir)?;
        println!("\n✅ All stages dumped to: {}", output.stages_dir);
    }
    Ok(())
}

fn save_stages(stages: &PipelineStages, summary: &RunSummary, output_dir: &str) -> Result<()> {
    fs::create_dir_all(output_dir)?;

    // Stage 1: Lines
    let lines_path = format!("{}/stage1_lines.json", output_dir);
    fs::write(&lines_path, serde_json::to_string_pretty(&stages.lines)?)?;
    println!("  💾 {} ({} lines)", lines_path, stages.lines.len());

    // Stage 2: Rule blocks
    let blocks_path = format!("{}/stage2_blocks.json", output_dir);
    fs::write(&blocks_path, serde_json::to_string_pretty(&stages.blocks)?)?;
    println!("  💾 {} ({} blocks)", blocks_path, stages.blocks.len());

    // Stage 3: Field mappings
    let fields_path = format!("{}/stage3_fields.json", output_dir);
    fs::write(&fields_path, serde_json::to_string_pretty(&stages.fields)?)?;
    println!("  💾 {} ({} mappings)", fields_path, stages.fields.len());

    // Stage 4: Rules
    let rules_path = format!("{}/stage4_rules.json", output_dir);
    fs::write(&rules_path, serde_json::to_string_pretty(&stages.rules)?)?;
    println!("  💾 {} ({} rules)", rules_path, stages.rules.len());

    // Summary file: quick reference for validation scripts
    let summary_json = serde_json::json!({
        "benchmark": summary.benchmark,
        "benchmark_version": summary.benchmark_version,
        "captured_at": chrono::Utc::now().to_rfc3339(),
        "stage_counts": {
            "lines": stages.lines.len(),
            "blocks": stages.blocks.len(),
            "field_mappings": stages.fields.len(),
            "rules": stages.rules.len(),
        },
        "run": summary,
    });
    let summary_path = format!("{}/summary.json", output_dir);
    fs::write(&summary_path, serde_json::to_string_pretty(&summary_json)?)?;
    println!("  💾 {}", summary_path);

    Ok(())
}
