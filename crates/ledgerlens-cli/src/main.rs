//! LedgerLens CLI tool.
//!
//! Runs the anomaly pipeline over a JSON transaction file and inspects the
//! available rule contexts and detectors.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use ledgerlens::core::context::GLOBAL_CONTEXT_ID;
use ledgerlens::core::observability::logging::LogLevel;
use ledgerlens::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "ledgerlens")]
#[command(version, about = "Transaction graph anomaly detection", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Engine configuration file (TOML). Defaults to LEDGERLENS_* variables.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a JSON transaction file
    Analyze {
        /// Input file: an array of transactions or `{"transactions": [...]}`
        #[arg(short, long)]
        input: PathBuf,

        /// Slice window (month, quarter, all)
        #[arg(short, long)]
        window: Option<SliceWindow>,

        /// Rule context id
        #[arg(long, default_value = GLOBAL_CONTEXT_ID)]
        context: String,

        /// Directory of additional JSON rule contexts
        #[arg(long)]
        contexts_dir: Option<PathBuf>,

        /// Skip the learned detector
        #[arg(long)]
        no_learned: bool,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// List available rule contexts
    Contexts {
        /// Directory of additional JSON rule contexts
        #[arg(long)]
        contexts_dir: Option<PathBuf>,
    },

    /// List pipeline kernels
    Detectors,

    /// Print the effective configuration as TOML
    Config {
        /// Start from a preset (development, production) instead of the file/env
        #[arg(long)]
        preset: Option<String>,
    },
}

/// Accepted shapes of the input document.
#[derive(Deserialize)]
#[serde(untagged)]
enum InputDocument {
    Records(Vec<Transaction>),
    Wrapped { transactions: Vec<Transaction> },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = LogLevel::Debug;
    }
    config.logging.init()?;

    match cli.command {
        Commands::Analyze {
            input,
            window,
            context,
            contexts_dir,
            no_learned,
            output,
            pretty,
        } => {
            if let Some(window) = window {
                config = config.with_window(window);
            }
            if no_learned {
                config = config.with_learned(false);
            }
            let contexts = load_contexts(contexts_dir.as_deref())?;
            contexts.set_active(&context)?;
            cmd_analyze(config, &contexts, &input, output.as_deref(), pretty)?;
        }

        Commands::Contexts { contexts_dir } => {
            cmd_contexts(&load_contexts(contexts_dir.as_deref())?);
        }

        Commands::Detectors => {
            cmd_detectors()?;
        }

        Commands::Config { preset } => {
            cmd_config(config, preset.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env()?,
    };
    Ok(config)
}

fn load_contexts(dir: Option<&Path>) -> anyhow::Result<ContextRegistry> {
    let registry = ContextRegistry::with_builtin();
    if let Some(dir) = dir {
        registry
            .load_dir(dir)
            .with_context(|| format!("loading contexts from {}", dir.display()))?;
    }
    Ok(registry)
}

fn read_transactions(path: &Path) -> anyhow::Result<Vec<Transaction>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_transactions(&content).with_context(|| format!("parsing {}", path.display()))
}

fn parse_transactions(content: &str) -> anyhow::Result<Vec<Transaction>> {
    let transactions = match serde_json::from_str(content)? {
        InputDocument::Records(records) => records,
        InputDocument::Wrapped { transactions } => transactions,
    };
    for tx in &transactions {
        tx.validate().with_context(|| format!("transaction {}", tx.id))?;
    }
    Ok(transactions)
}

fn cmd_analyze(
    config: EngineConfig,
    contexts: &ContextRegistry,
    input: &Path,
    output: Option<&Path>,
    pretty: bool,
) -> anyhow::Result<()> {
    let transactions = read_transactions(input)?;
    let context = contexts.active();
    info!(
        input = %input.display(),
        transactions = transactions.len(),
        context = %context.id,
        window = %config.graph.window,
        "Starting analysis"
    );

    let engine = AnalysisEngine::new(config)?;
    let report = engine.analyze(&transactions, &context)?;

    for (anomaly_type, count) in report.counts_by_type() {
        info!(anomaly_type = %anomaly_type, count, "Findings");
    }
    if !report.is_complete() {
        tracing::warn!(
            failed = ?report.failed_slices,
            cancelled = ?report.cancelled_slices,
            "Analysis incomplete"
        );
    }

    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(output = %path.display(), results_hash = %report.results_hash, "Report written");
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn cmd_contexts(contexts: &ContextRegistry) {
    println!("Rule contexts ({}):\n", contexts.len());
    let active = contexts.active_id();
    for (id, name) in contexts.available() {
        let marker = if id == active { "*" } else { " " };
        println!(" {marker} {id:<16} {name}");
        if let Some(context) = contexts.get(&id) {
            let enabled: Vec<&str> = context
                .flags
                .iter()
                .filter(|(_, on)| **on)
                .map(|(flag, _)| flag.as_str())
                .collect();
            if !enabled.is_empty() {
                println!("   {:<16} flags: {}", "", enabled.join(", "));
            }
        }
    }
}

fn cmd_detectors() -> anyhow::Result<()> {
    let registry = KernelRegistry::new();
    ledgerlens::register_all(&registry)?;

    let mut kernels = registry.all();
    kernels.sort_by(|a, b| a.stage.cmp(&b.stage).then_with(|| a.id.cmp(&b.id)));

    println!("Pipeline kernels ({}):\n", kernels.len());
    for meta in &kernels {
        println!("  [{:<13}] {:<28} - {}", meta.stage.as_str(), meta.id, meta.description);
        if !meta.emits.is_empty() {
            let emits: Vec<&str> = meta.emits.iter().map(|t| t.label()).collect();
            println!("  {:<15} {:<28}   emits: {}", "", "", emits.join(", "));
        }
    }

    Ok(())
}

fn cmd_config(config: EngineConfig, preset: Option<&str>) -> anyhow::Result<()> {
    let config = match preset {
        None => config,
        Some("development" | "dev") => EngineConfig::development(),
        Some("production" | "prod") => EngineConfig::production(),
        Some(other) => anyhow::bail!("unknown preset: {other}"),
    };
    config.validate()?;
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlens::core::context::FLAG_VAT;
    use std::io::Write;

    const RECORD: &str = r#"{
        "transaction_id": "t1",
        "source_entity": "A",
        "target_entity": "B",
        "amount": 120.5,
        "timestamp": "2024-03-01T10:00:00Z",
        "type": "invoice",
        "tax_type": "GST",
        "input_tax_credit": 21.7
    }"#;

    #[test]
    fn test_parse_array_and_wrapped() {
        let array = parse_transactions(&format!("[{RECORD}]")).unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0].id, "t1");
        assert_eq!(array[0].tx_type, "invoice");
        assert_eq!(array[0].input_tax_credit(), 21.7);

        let wrapped = parse_transactions(&format!(r#"{{"transactions": [{RECORD}]}}"#)).unwrap();
        assert_eq!(wrapped, array);
    }

    #[test]
    fn test_parse_rejects_negative_amount() {
        let bad = RECORD.replace("120.5", "-1.0");
        assert!(parse_transactions(&format!("[{bad}]")).is_err());
    }

    #[test]
    fn test_contexts_dir_extends_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("uk_vat.json")).unwrap();
        file.write_all(
            br#"{"context_id": "uk_vat", "name": "UK VAT", "flags": {"vat_enabled": true}}"#,
        )
        .unwrap();

        let contexts = load_contexts(Some(dir.path())).unwrap();
        assert_eq!(contexts.len(), 4);
        contexts.set_active("uk_vat").unwrap();
        assert!(contexts.active().flag(FLAG_VAT));
    }

    #[test]
    fn test_shipped_demo_ledger_and_contexts() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let transactions = read_transactions(&root.join("demos/sample_ledger.json")).unwrap();
        assert_eq!(transactions.len(), 14);

        let contexts = load_contexts(Some(&root.join("contexts"))).unwrap();
        assert_eq!(contexts.len(), 3);
        contexts.set_active("india_gst").unwrap();

        let engine = AnalysisEngine::new(EngineConfig::development()).unwrap();
        let report = engine.analyze(&transactions, &contexts.active()).unwrap();
        assert_eq!(report.slices.len(), 3);
        assert!(report.anomalies.iter().any(|a| {
            a.anomaly_type == AnomalyType::CircularTrading
                && a.explanation_metadata.contains_key("context_tags")
        }));
    }

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "ledgerlens",
            "analyze",
            "--input",
            "ledger.json",
            "--window",
            "quarter",
            "--context",
            "india_gst",
            "--pretty",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                window, context, pretty, ..
            } => {
                assert_eq!(window, Some(SliceWindow::Quarter));
                assert_eq!(context, "india_gst");
                assert!(pretty);
            }
            _ => panic!("expected analyze"),
        }
    }
}
