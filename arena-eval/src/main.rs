//! ARENA evaluation CLI

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use arena_eval::{
    analysis::RunningMetrics,
    cases::{builtin_cases, load_cases_from_file, prompts::render_judge_prompt, BenchmarkCase, Modality},
    config::{Config, ProviderKind},
    reporting::{print_console_report, read_results_jsonl, JsonSummary, ResultLog},
    runner::{ConsoleProgress, Orchestrator, ProgressSink},
};

#[derive(Parser)]
#[command(name = "arena-eval")]
#[command(about = "Evaluate a model on DSQA reasoning and FACTS multimodal fact-checking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the subject model on a dataset
    Run {
        /// JSON dataset file (default: built-in cases)
        #[arg(long)]
        cases: Option<PathBuf>,

        /// Only run cases of this modality (dsqa, facts)
        #[arg(long)]
        modality: Option<Modality>,

        /// Pause between cases in milliseconds
        #[arg(long)]
        pacing_ms: Option<u64>,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Score the subject's own structured output instead of calling a judge
        #[arg(long)]
        self_judge: bool,

        /// Subject provider (gemini, openai)
        #[arg(long)]
        subject_provider: Option<ProviderKind>,

        /// Subject model id
        #[arg(long)]
        subject_model: Option<String>,

        /// Subject endpoint base URL
        #[arg(long)]
        subject_url: Option<String>,

        /// Environment variable holding the subject API key
        #[arg(long)]
        subject_key_env: Option<String>,

        /// Judge provider (gemini, openai)
        #[arg(long)]
        judge_provider: Option<ProviderKind>,

        /// Judge model id
        #[arg(long)]
        judge_model: Option<String>,
    },

    /// List benchmark cases
    ListCases {
        /// JSON dataset file (default: built-in cases)
        #[arg(long)]
        cases: Option<PathBuf>,

        /// Only list cases of this modality
        #[arg(long)]
        modality: Option<Modality>,
    },

    /// Write the subject and judge prompts for every case to text files
    DumpPrompts {
        /// Output directory for prompt files
        #[arg(short, long, default_value = "results/prompts")]
        output: PathBuf,

        /// JSON dataset file (default: built-in cases)
        #[arg(long)]
        cases: Option<PathBuf>,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/arena.toml")]
        output: PathBuf,
    },

    /// Recompute aggregate metrics from a results.jsonl file
    Rescore {
        /// Path to results.jsonl
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("arena_eval=debug,info")
        } else {
            EnvFilter::new("arena_eval=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Run {
            cases,
            modality,
            pacing_ms,
            output,
            self_judge,
            subject_provider,
            subject_model,
            subject_url,
            subject_key_env,
            judge_provider,
            judge_model,
        } => {
            let mut config = config;
            if let Some(provider) = subject_provider {
                config.subject.provider = provider;
            }
            if let Some(model) = subject_model {
                config.subject.model = model;
            }
            if subject_url.is_some() {
                config.subject.base_url = subject_url;
            }
            if subject_key_env.is_some() {
                config.subject.api_key_env = subject_key_env;
            }
            if let Some(provider) = judge_provider {
                config.judge.provider = provider;
            }
            if let Some(model) = judge_model {
                config.judge.model = model;
            }
            if let Some(pacing_ms) = pacing_ms {
                config.benchmark.pacing_ms = pacing_ms;
            }
            config.validate()?;

            let cases = load_cases(cases, modality)?;
            run_evaluation(config, cases, output, self_judge).await?;
        }

        Commands::ListCases { cases, modality } => {
            list_cases(load_cases(cases, modality)?);
        }

        Commands::DumpPrompts { output, cases } => {
            dump_prompts(output, load_cases(cases, None)?)?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }

        Commands::Rescore { input } => {
            rescore(input, &config)?;
        }
    }

    Ok(())
}

async fn run_evaluation(
    config: Config,
    cases: Vec<BenchmarkCase>,
    output_dir: Option<PathBuf>,
    self_judge: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let run_dir = output_dir
        .unwrap_or_else(|| PathBuf::from(&config.benchmark.output_dir))
        .join(&stamp);

    println!("=== ARENA Evaluation ===");
    println!("Subject: {}", config.subject.label());
    if self_judge {
        println!("Judge:   self-reported");
    } else {
        println!("Judge:   {}", config.judge.label());
    }
    println!("Cases:   {}", cases.len());
    println!("Output:  {}", run_dir.display());
    println!();

    // Credentials are checked here, before anything is written
    let orchestrator = Orchestrator::from_config(&config, self_judge)?;

    let log = Arc::new(ResultLog::create(run_dir.join("results.jsonl"))?);
    let mut handle = orchestrator.with_sink(log).spawn(cases);

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            cancel.cancel();
        }
    });

    let console = ConsoleProgress;
    while let Some(event) = handle.next_event().await {
        console.on_event(&event);
    }

    let (_orchestrator, outcome) = handle.join().await?;
    let report = outcome?;

    print_console_report(&report.results, &report.metrics);

    let summary_path = run_dir.join("summary.json");
    JsonSummary::from_report(&report, "results.jsonl").write_to_file(&summary_path)?;
    println!("Summary written to: {}", summary_path.display());
    if report.cancelled {
        println!(
            "Run was cancelled; {} of {} cases were evaluated",
            report.results.len(),
            report.total_cases
        );
    }

    Ok(())
}

fn load_cases(
    path: Option<PathBuf>,
    modality: Option<Modality>,
) -> Result<Vec<BenchmarkCase>, Box<dyn std::error::Error>> {
    let mut cases = match path {
        Some(path) => load_cases_from_file(&path)?,
        None => builtin_cases(),
    };

    if let Some(modality) = modality {
        cases.retain(|c| c.modality() == modality);
    }

    Ok(cases)
}

fn list_cases(cases: Vec<BenchmarkCase>) {
    println!("Available Cases ({}):", cases.len());
    println!("{:-<60}", "");

    for case in &cases {
        println!(
            "  {} | {} | {} | {} facts",
            case.id(),
            case.modality(),
            case.domain(),
            case.ground_truth().len()
        );
    }
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}

fn dump_prompts(
    output_dir: PathBuf,
    cases: Vec<BenchmarkCase>,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&output_dir)?;

    println!("=== Dumping Prompts ===");
    println!("Cases:  {}", cases.len());
    println!("Output: {}", output_dir.display());
    println!();

    for case in &cases {
        let subject_file = format!("{}-subject.txt", case.id().to_lowercase());
        let subject = format!(
            "=== Subject Prompt: {} ===\nModality: {}\nDomain:   {}\n{}\n\n{}",
            case.id(),
            case.modality(),
            case.domain(),
            "=".repeat(50),
            case.template().render(case)
        );
        std::fs::write(output_dir.join(&subject_file), subject)?;

        let judge_file = format!("{}-judge.txt", case.id().to_lowercase());
        let judge = format!(
            "=== Judge Prompt: {} ===\n{}\n\n{}",
            case.id(),
            "=".repeat(50),
            render_judge_prompt(case, "<candidate response>")
        );
        std::fs::write(output_dir.join(&judge_file), judge)?;

        println!("  {} -> {}, {}", case.label(), subject_file, judge_file);
    }

    println!("\nDone. {} files written to {}", cases.len() * 2, output_dir.display());
    Ok(())
}

fn rescore(input: PathBuf, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let results = read_results_jsonl(&input)?;
    println!("Rescoring {} results from {}", results.len(), input.display());

    let mut running = RunningMetrics::new(config.scoring.weights);
    for result in &results {
        running.push(result);
    }

    print_console_report(&results, &running.snapshot());
    Ok(())
}
