//! CareCheck CLI - runs UI verification scenarios against the web app
//!
//! Exit codes: 0 when every scenario passed, 1 when any failed, 2 when the
//! harness itself could not run (bad configuration, unknown scenario).

use std::path::PathBuf;

use anyhow::Context;
use carecheck_harness::{HarnessConfig, PlaywrightLauncher, ScenarioRunner};
use carecheck_scenarios::{select, DEFAULT_BASE_URL};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CareCheck - browser verification for the health-services app
#[derive(Parser)]
#[command(name = "carecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available scenarios
    List {
        /// Application base URL
        #[arg(long, env = "CARECHECK_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },

    /// Run scenarios and write evidence
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Application base URL
    #[arg(long, env = "CARECHECK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Scenario to run (repeatable); all scenarios when omitted
    #[arg(short, long = "scenario")]
    scenarios: Vec<String>,

    /// Configuration file
    #[arg(short, long, default_value = "carecheck.toml")]
    config: PathBuf,

    /// Evidence root directory
    #[arg(long)]
    evidence_dir: Option<PathBuf>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Scenarios to run at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Do not probe the base URL before launching browsers
    #[arg(long)]
    skip_preflight: bool,

    /// Print the suite result as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let result = tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")
        .and_then(|rt| rt.block_on(async_main(cli.command)));

    match result {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::List { base_url } => {
            for scenario in select(&base_url, &[])? {
                println!("{:<20} {:<40} {}", scenario.name, scenario.start_url(), scenario.description);
            }
            Ok(true)
        }
        Commands::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<bool> {
    let mut config = HarnessConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?
        .apply_env()?;

    if let Some(browser) = &args.browser {
        config.browser.kind = browser.parse()?;
    }
    if args.headed {
        config.browser.headless = false;
    }
    if let Some(dir) = args.evidence_dir {
        config.evidence.root = dir;
    }
    // The CLI always probes unless told not to
    config.preflight = !args.skip_preflight;
    config.validate()?;

    let scenarios = select(&args.base_url, &args.scenarios)?;
    info!(
        base_url = %args.base_url,
        browser = config.browser.kind.as_str(),
        "Running {} scenario(s)",
        scenarios.len()
    );

    let evidence_root = config.evidence.root.clone();
    let runner = ScenarioRunner::new(PlaywrightLauncher, config);
    let suite = runner.run_all(&scenarios, args.concurrency).await;

    suite
        .write(&evidence_root)
        .context("writing suite results")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&suite)?);
    } else {
        for result in &suite.results {
            let mark = if result.passed() { "PASS" } else { "FAIL" };
            println!(
                "{} {:<20} {:>6} ms  {}",
                mark,
                result.scenario,
                result.duration_ms,
                result.evidence_dir.display()
            );
            if let Some(error) = &result.error {
                println!("     {}", error);
            }
        }
        println!(
            "{} passed, {} failed ({} ms)",
            suite.passed, suite.failed, suite.duration_ms
        );
    }

    Ok(suite.all_passed())
}
