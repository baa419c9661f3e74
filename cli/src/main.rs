//! testrail-report - push test runs and results to TestRail.
//!
//! Settings come from a `cypress.env.json`-style file (`--config`), with
//! command-line flags and `TESTRAIL_*` variables taking precedence.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use testrail_core::{config::parse_id, ReporterConfig, TestResult};

mod report;

use report::ReportPlan;

/// Report test runs and results to TestRail
#[derive(Parser)]
#[command(name = "testrail-report")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Settings {
    /// JSON config file; settings may sit under a `testrail` key
    #[arg(short, long, env = "TESTRAIL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// TestRail host, e.g. acme.testrail.io
    #[arg(long, env = "TESTRAIL_DOMAIN", global = true)]
    domain: Option<String>,

    #[arg(long, env = "TESTRAIL_USERNAME", global = true)]
    username: Option<String>,

    /// Password or API key
    #[arg(long, env = "TESTRAIL_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Upload screenshots attached to results
    #[arg(long, global = true, conflicts_with = "no_screenshots")]
    screenshots: bool,

    /// Skip screenshot uploads even if the config file enables them
    #[arg(long, global = true)]
    no_screenshots: bool,

    /// Request timeout in seconds
    #[arg(long, env = "TESTRAIL_TIMEOUT", global = true)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty run and print its id
    CreateRun {
        #[arg(long, value_parser = id)]
        project: Option<u64>,
        #[arg(long, value_parser = id)]
        milestone: Option<u64>,
        #[arg(long, value_parser = id)]
        suite: Option<u64>,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Replace the cases of a run
    UpdateRun {
        #[arg(long, value_parser = id)]
        run: u64,
        /// Comma separated case ids, e.g. C1,C2,3
        #[arg(long, value_delimiter = ',', value_parser = id, required = true)]
        cases: Vec<u64>,
    },

    /// Close a run
    CloseRun {
        #[arg(long, value_parser = id)]
        run: u64,
    },

    /// Send a single result
    SendResult {
        #[arg(long, value_parser = id)]
        run: u64,
        #[arg(long = "case", value_parser = id)]
        case_id: u64,
        /// TestRail status id (1 passed, 2 blocked, 4 retest, 5 failed)
        #[arg(long)]
        status: u32,
        #[arg(long, default_value = "")]
        comment: String,
        /// Timespan such as "1m 5s"
        #[arg(long)]
        elapsed: Option<String>,
        #[arg(long)]
        screenshot: Option<String>,
    },

    /// Send every result from a JSON file
    Report(ReportArgs),
}

#[derive(Args)]
struct ReportArgs {
    /// Results file: an array of results or an object with `results`
    results: PathBuf,

    /// Existing run to report into
    #[arg(long, value_parser = id)]
    run: Option<u64>,

    /// Project to create a run in
    #[arg(long, value_parser = id)]
    project: Option<u64>,

    /// Name of the created run
    #[arg(long)]
    name: Option<String>,

    /// Close the run afterwards
    #[arg(long)]
    close: bool,

    /// Exit non-zero when any result could not be reported
    #[arg(long)]
    fail_on_error: bool,
}

fn id(raw: &str) -> Result<u64, String> {
    parse_id(raw)?.ok_or_else(|| "id must not be empty".to_string())
}

impl Settings {
    fn load(&self) -> anyhow::Result<ReporterConfig> {
        let mut config = match &self.config {
            Some(path) => ReporterConfig::from_path(path)?,
            None => ReporterConfig::default(),
        };
        if let Some(domain) = &self.domain {
            config.domain = domain.clone();
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if self.screenshots {
            config.screenshots = true;
        }
        if self.no_screenshots {
            config.screenshots = false;
        }
        if self.timeout_secs.is_some() {
            config.timeout_secs = self.timeout_secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let config = cli.settings.load()?;
    let testrail = config.testrail().context("invalid TestRail settings")?;

    match cli.command {
        Commands::CreateRun {
            project,
            milestone,
            suite,
            name,
            description,
        } => {
            let project = project
                .or(config.project_id)
                .context("a project id is required (--project or projectId)")?;
            let run_id = testrail
                .create_run(
                    project,
                    milestone.or(config.milestone_id),
                    suite.or(config.suite_id),
                    &name,
                    &description,
                )
                .await?;
            println!("{run_id}");
        }
        Commands::UpdateRun { run, cases } => testrail.update_run(run, &cases).await?,
        Commands::CloseRun { run } => testrail.close_run(run).await?,
        Commands::SendResult {
            run,
            case_id,
            status,
            comment,
            elapsed,
            screenshot,
        } => {
            let mut result = TestResult::new(case_id, status, comment);
            if let Some(elapsed) = elapsed {
                result = result.with_elapsed(elapsed);
            }
            if let Some(path) = screenshot {
                result = result.with_screenshot(path);
            }
            let sent = testrail.send_result(run, &result).await?;
            if let Some(upload) = sent.screenshot_upload {
                upload.await.context("screenshot upload task")?;
            }
            println!("{}", sent.result_id);
        }
        Commands::Report(args) => {
            let results = report::load_results(&args.results)?;
            let plan = ReportPlan {
                run_id: args.run.or(config.run_id),
                project_id: args.project.or(config.project_id),
                milestone_id: config.milestone_id,
                suite_id: config.suite_id,
                run_name: args
                    .name
                    .or_else(|| config.run_name.clone())
                    .unwrap_or_else(|| "Automated test run".to_string()),
                run_description: config.run_description.clone().unwrap_or_default(),
                close_run: args.close || config.close_run,
            };
            let summary = report::report(&testrail, &plan, &results).await?;
            println!(
                "run R{}: {} sent, {} failed{}",
                summary.run_id,
                summary.sent,
                summary.failed,
                if summary.closed { ", closed" } else { "" }
            );
            if args.fail_on_error && summary.failed > 0 {
                anyhow::bail!("{} TestRail update(s) failed", summary.failed);
            }
        }
    }

    Ok(())
}
