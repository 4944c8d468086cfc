use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

use ui_runner::aggregate::drift;
use ui_runner::client::ServiceClient;
use ui_runner::config::Settings;
use ui_runner::engine::ExecutionEngine;
use ui_runner::errors::StructuredError;
use ui_runner::executors::SimulatedDriver;
use ui_runner::generation::{HttpModelBackend, TaskComplexity, TestGenerator};
use ui_runner::limits::{validate_options, ExecutionLimits};
use ui_runner::locator::{resolve, ResolveError, StaticPage};
use ui_runner::protocol::{
    BrowserKind, ElementLocator, ExecutionOptions, ExecutionRequest, ExecutionStatus, GenerationRequest,
};
use ui_runner::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use ui_runner::{loader, validation};

#[derive(Parser)]
#[command(name = "ui-runner")]
#[command(about = "UI test automation runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RunOptions {
    /// chromium, firefox or webkit
    #[arg(long, value_parser = parse_browser)]
    browser: Option<BrowserKind>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Default per-step timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Keep running body steps after a failure
    #[arg(long)]
    continue_on_failure: bool,
}

impl RunOptions {
    fn resolve(&self, settings: &Settings) -> ExecutionOptions {
        let mut options = settings.execution_options();
        if let Some(browser) = self.browser {
            options.browser = browser;
        }
        if self.headed {
            options.headless = false;
        }
        if let Some(timeout) = self.timeout {
            options.timeout = timeout;
        }
        options.stop_on_failure = !self.continue_on_failure;
        options
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl From<Complexity> for TaskComplexity {
    fn from(c: Complexity) -> Self {
        match c {
            Complexity::Simple => Self::Simple,
            Complexity::Medium => Self::Medium,
            Complexity::Complex => Self::Complex,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validates a test case file and prints the assembled test case
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Resolves a locator against a page snapshot
    Resolve {
        /// Page snapshot(s), JSON
        #[arg(short, long)]
        pages: PathBuf,

        /// Locator, JSON
        #[arg(short, long)]
        locator: PathBuf,

        /// Page URL to query (defaults to the first page)
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Runs a test case against page snapshots with the simulated driver
    Run {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        pages: PathBuf,

        /// Where to write the execution report (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Recomputes a stored execution and reports any drift
    Summarize {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Generates a test case from a description
    Generate {
        description: String,

        #[arg(long, value_enum, default_value = "medium")]
        complexity: Complexity,

        /// Call the model directly instead of the remote service
        #[arg(long)]
        local: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Submits a run to the remote execution service
    Submit {
        /// Inline test case file
        #[arg(short, long, conflicts_with = "test_id", required_unless_present = "test_id")]
        file: Option<PathBuf>,

        /// Stored test case id
        #[arg(long)]
        test_id: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: RunOptions,
    },
}

fn parse_browser(raw: &str) -> Result<BrowserKind, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    let telemetry = TelemetryConfig {
        log_format: settings.log_format,
        log_level: settings.log_level,
        ..TelemetryConfig::from_env()
    };
    let otlp = match init_telemetry(telemetry) {
        Ok(tracer) => tracer.is_some(),
        Err(e) => {
            eprintln!("⚠️  Telemetry disabled: {:#}", e);
            false
        }
    };

    let outcome = match cli.command {
        Commands::Validate { file } => validate(&file),
        Commands::Resolve { pages, locator, url } => resolve_locator(&pages, &locator, url.as_deref()).await,
        Commands::Run {
            file,
            pages,
            output,
            options,
        } => run(&settings, &file, &pages, output.as_deref(), &options).await,
        Commands::Summarize { file } => summarize(&file),
        Commands::Generate {
            description,
            complexity,
            local,
            output,
        } => generate(&settings, description, complexity.into(), local, output.as_deref()).await,
        Commands::Submit {
            file,
            test_id,
            output,
            options,
        } => submit(&settings, file.as_deref(), test_id, output.as_deref(), &options).await,
    };

    if otlp {
        shutdown_telemetry();
    }

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn emit<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            loader::save_json(path, value)?;
            println!("📄 Report saved to: {:?}", path);
        }
        None => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn validate(file: &Path) -> Result<bool> {
    let create = loader::load_test_case(file)?;
    match validation::assemble(create, chrono::Utc::now()) {
        Ok(test_case) => {
            println!("✅ Valid: {} ({} steps)", test_case.name, test_case.steps.len());
            emit(&test_case, None)?;
            Ok(true)
        }
        Err(errors) => {
            println!("❌ {} validation error(s):", errors.len());
            for error in &errors {
                println!("   {}", StructuredError::new(error.code(), error.to_string()).user_message());
            }
            Ok(false)
        }
    }
}

async fn resolve_locator(pages: &Path, locator: &Path, url: Option<&str>) -> Result<bool> {
    let pages = loader::load_pages(pages)?;
    let locator: ElementLocator = loader::load_json(locator)?;

    let page = match url {
        Some(url) => pages.into_iter().find(|p| p.url == url),
        None => pages.into_iter().next(),
    }
    .context("No matching page in snapshot file")?;

    println!("🔎 Resolving '{}' on {}", locator.name, page.url);
    match resolve(&StaticPage::new(page), &locator).await {
        Ok(resolution) => {
            for attempt in &resolution.attempts {
                println!("   {} = {} → {} match(es)", attempt.strategy, attempt.selector, attempt.matches);
            }
            println!("✅ {} via {} ({} ms)", resolution.handle, resolution.strategy, resolution.duration_ms);
            Ok(true)
        }
        Err(ResolveError::NotFound(err)) => {
            println!("❌ {}", StructuredError::new(err.code(), err.to_string()).user_message());
            Ok(false)
        }
        Err(ResolveError::Engine(message)) => bail!("page query failed: {}", message),
    }
}

async fn run(
    settings: &Settings,
    file: &Path,
    pages: &Path,
    output: Option<&Path>,
    run_options: &RunOptions,
) -> Result<bool> {
    println!("🚀 Runner Initializing...");
    let limits = ExecutionLimits::from_env();
    let options = run_options.resolve(settings);

    let check = validate_options(&options, &limits);
    if !check.passed {
        for violation in &check.violations {
            eprintln!("❌ {}", violation.message);
        }
        return Ok(false);
    }

    let create = validation::normalize(loader::load_test_case(file)?);
    if let Err(errors) = validation::validate_test_case(&create.name, &create, &limits) {
        for error in &errors {
            eprintln!("❌ {}", StructuredError::new(error.code(), error.to_string()).user_message());
        }
        return Ok(false);
    }
    println!("📋 Test Loaded: {} ({} steps)", create.name, create.steps.len());

    let driver = Arc::new(SimulatedDriver::new(loader::load_pages(pages)?));
    let engine = ExecutionEngine::new(driver, limits).on_step(|result| {
        println!("   {} {} #{} {}", icon(result.status), result.phase, result.step_number, result.description);
        if let Some(error) = &result.error_message {
            println!("      {}", error);
        }
    });

    let cancel = engine.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    println!("▶️  Starting Execution...");
    let execution = engine.execute(&create.name, &create, &options).await;
    println!(
        "🏁 {}: {} passed, {} failed, {} skipped, {} error(s) in {} ms",
        execution.status,
        execution.passed_steps,
        execution.failed_steps,
        execution.skipped_steps,
        execution.error_steps,
        execution.duration_ms
    );

    emit(&execution, output)?;
    Ok(execution.status == ExecutionStatus::Passed)
}

fn summarize(file: &Path) -> Result<bool> {
    let execution = loader::load_execution(file)?;
    println!(
        "📊 {} [{}]: {}/{} passed",
        execution.test_name, execution.status, execution.passed_steps, execution.total_steps
    );

    let issues = drift(&execution);
    if issues.is_empty() {
        println!("✅ Stored summary matches its step results");
        return Ok(true);
    }
    println!("⚠️  Stored summary drifted:");
    for issue in &issues {
        println!("   {}", issue);
    }
    Ok(false)
}

async fn generate(
    settings: &Settings,
    description: String,
    complexity: TaskComplexity,
    local: bool,
    output: Option<&Path>,
) -> Result<bool> {
    let request = GenerationRequest::new(description);

    let response = if local {
        let generator = TestGenerator::new(Arc::new(HttpModelBackend::from_env()), settings.generation.clone());
        generator.generate(&request, complexity).await
    } else {
        ServiceClient::from_settings(settings)?.generate(&request).await?
    };

    if !response.success {
        println!("❌ Generation failed: {}", response.error.as_deref().unwrap_or("unknown error"));
        return Ok(false);
    }

    println!(
        "🤖 Generated with {} ({} tokens{})",
        response.model_used,
        response.tokens_used,
        if response.cached { ", cached" } else { "" }
    );
    match &response.test_case {
        Some(test_case) => emit(test_case, output)?,
        None => bail!("service reported success without a test case"),
    }
    Ok(true)
}

async fn submit(
    settings: &Settings,
    file: Option<&Path>,
    test_id: Option<String>,
    output: Option<&Path>,
    run_options: &RunOptions,
) -> Result<bool> {
    let mut request = match (file, test_id) {
        (Some(file), None) => ExecutionRequest::inline(loader::load_test_case(file)?),
        (None, Some(id)) => ExecutionRequest::for_test(id),
        _ => bail!("pass exactly one of --file or --test-id"),
    };
    request.options = run_options.resolve(settings);

    let client = ServiceClient::from_settings(settings)?;
    println!("📤 Submitting to {}", client.base_url());
    let execution = client.run(&request).await?;
    println!("🏁 {} {}", icon(execution.status), execution.status);

    emit(&execution, output)?;
    Ok(execution.status == ExecutionStatus::Passed)
}

fn icon(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Passed => "✅",
        ExecutionStatus::Failed => "❌",
        ExecutionStatus::Skipped => "⏭️",
        ExecutionStatus::Error => "💥",
        ExecutionStatus::Pending | ExecutionStatus::Running => "⏳",
    }
}
