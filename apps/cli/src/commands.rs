//! CLI command definitions, routing, and tracing setup.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use skillforge_core::executor::{self, ProgressReporter, RunResult};
use skillforge_core::{report, scaffold, status, validate};
use skillforge_shared::{
    AppConfig, BatchConfig, IterationState, STATUS_FILE_NAME, expand_home, init_config,
    load_config,
};

/// Exit codes above this collide with shells' signal-range codes.
const MAX_FAILURE_EXIT_CODE: u32 = 101;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SkillForge — run a skill-generation workflow in batches.
#[derive(Parser)]
#[command(
    name = "skillforge",
    version,
    about = "Run N iterations of an external skill-generation workflow with bounded concurrency.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Execute a batch run for a topic.
    Run {
        /// Topic handed to the workflow as its positional argument.
        topic: String,

        /// Number of iterations to run (default from config, normally 1).
        iterations: Option<u32>,

        /// Maximum concurrently running iterations.
        #[arg(short, long)]
        parallel: Option<u32>,

        /// Per-attempt timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Retries per iteration after the first failed attempt.
        #[arg(long)]
        retries: Option<u32>,

        /// Root directory run directories are created under.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Regenerate REPORT.md from an existing run directory.
    Report {
        /// Run directory containing STATUS.json.
        run_dir: String,
    },

    /// Validate a generated skill directory.
    Validate {
        /// Skill directory containing SKILL.md.
        skill_dir: String,
    },

    /// Write starter files (config stub, skill template) into a project.
    Init {
        /// Target directory (defaults to the current directory).
        dir: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "skillforge=info",
        1 => "skillforge=debug",
        _ => "skillforge=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command. The returned exit code is the count of failed
/// iterations for `run`, so calling automation can branch on partial failure.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Run {
            topic,
            iterations,
            parallel,
            timeout,
            retries,
            output,
        } => {
            cmd_run(
                &topic,
                iterations,
                parallel,
                timeout,
                retries,
                output.as_deref(),
            )
            .await
        }
        Command::Report { run_dir } => cmd_report(&run_dir),
        Command::Validate { skill_dir } => cmd_validate(&skill_dir),
        Command::Init { dir } => cmd_init(dir.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    topic: &str,
    iterations: Option<u32>,
    parallel: Option<u32>,
    timeout: Option<u64>,
    retries: Option<u32>,
    output: Option<&str>,
) -> Result<ExitCode> {
    let config = load_config()?;
    let mut batch = BatchConfig::from_app_config(topic, &config);

    // CLI flags override config file values, which override defaults.
    if let Some(n) = iterations {
        batch.iterations = n;
    }
    if let Some(p) = parallel {
        batch.parallel = p;
    }
    if let Some(t) = timeout {
        batch.timeout = Duration::from_secs(t);
    }
    if let Some(r) = retries {
        batch.max_retries = r;
    }
    if let Some(o) = output {
        batch.output_dir = expand_home(o);
    }

    info!(
        topic,
        iterations = batch.iterations,
        parallel = batch.parallel,
        timeout_secs = batch.timeout.as_secs(),
        retries = batch.max_retries,
        "starting batch run"
    );

    let reporter = CliProgress::new();
    let result = executor::execute(&batch, &reporter).await?;

    println!();
    println!("  Run {}", result.status.as_str());
    println!("  Run ID:    {}", result.run_id);
    println!(
        "  Completed: {}/{}",
        result.completed,
        result.completed + result.failed
    );
    println!("  Failed:    {}", result.failed);
    println!("  Output:    {}", result.run_dir.display());
    println!("  Report:    {}", result.report_path.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(failure_exit_code(result.failed))
}

/// Exit code equals the failed-iteration count, saturated below the
/// signal range.
fn failure_exit_code(failed: u32) -> ExitCode {
    ExitCode::from(failure_code(failed))
}

fn failure_code(failed: u32) -> u8 {
    failed.min(MAX_FAILURE_EXIT_CODE) as u8
}

// ---------------------------------------------------------------------------
// report
// ---------------------------------------------------------------------------

fn cmd_report(run_dir: &str) -> Result<ExitCode> {
    let run_dir = expand_home(run_dir);
    let status = status::load_status(&run_dir.join(STATUS_FILE_NAME))?;
    let path = report::write(&run_dir, &status)?;

    println!("Report regenerated at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn cmd_validate(skill_dir: &str) -> Result<ExitCode> {
    let validation = validate::validate_skill(&expand_home(skill_dir))?;

    println!();
    println!("Validation results for '{}':", validation.skill_name);
    for check in &validation.checks {
        let mark = if check.passed { "ok" } else { "FAIL" };
        println!("  [{mark:>4}] {}", check.name);
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &validation.warnings {
            println!("  - {warning}");
        }
    }

    if !validation.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &validation.errors {
            println!("  - {error}");
        }
    }

    println!();
    if validation.all_passed() {
        println!("All checks passed.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Validation failed.");
        Ok(ExitCode::FAILURE)
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn cmd_init(dir: Option<&str>) -> Result<ExitCode> {
    let target = match dir {
        Some(d) => expand_home(d),
        None => std::env::current_dir()?,
    };

    let created = scaffold::init_project(&target)?;

    println!("Initialized project at: {}", target.display());
    for path in created {
        println!("  wrote {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<ExitCode> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show() -> Result<ExitCode> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn iteration_started(&self, index: u32, total: u32) {
        self.spinner
            .set_message(format!("Running iteration [{index}/{total}]"));
    }

    fn iteration_finished(&self, index: u32, state: IterationState, attempts: u32) {
        self.spinner.println(format!(
            "  iteration {index}: {} ({attempts} attempt{})",
            state.as_str(),
            if attempts == 1 { "" } else { "s" }
        ));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}
