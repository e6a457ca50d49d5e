use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use crate::config::{Config, OutputFormat};
use crate::jira::JiraClient;
use crate::output::{self, BulkProgressBar, ExecutionLog};
use crate::sync::{
    BulkDriver, CancelFlag, FieldMapper, LinkResolver, MappingReport, SyncEngine, SyncResult, SyncStatus,
};

#[derive(Parser)]
#[command(name = "jpd-sync")]
#[command(
    author,
    version,
    about = "Sync milestone dates between Jira issues and Jira Product Discovery ideas",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Jira base URL
    #[arg(long, global = true, env = "JIRA_URL")]
    url: Option<String>,

    /// Account email for basic authentication
    #[arg(long, global = true, env = "JIRA_EMAIL")]
    email: Option<String>,

    /// API token for basic authentication
    #[arg(long, global = true, env = "JIRA_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Personal access token, used instead of email + API token
    #[arg(long, global = true, env = "JIRA_BEARER_TOKEN", hide_env_values = true)]
    bearer: Option<String>,

    /// Show what would change without writing anything
    #[arg(short = 'n', long, global = true, default_value_t = false)]
    dry_run: bool,

    /// Write without asking for confirmation
    #[arg(short = 'y', long, global = true, default_value_t = false)]
    force: bool,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Write the JSON report to this file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    /// Save an execution summary to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Suppress the banner and terminal summaries
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy milestone dates from SOURCE to TARGET
    Sync { source: String, target: String },

    /// Copy dates onto an idea from its linked delivery issue
    AutoSync { idea: String },

    /// Auto sync every idea of a Product Discovery project
    BulkSync {
        project: String,

        /// Pause between ideas in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Show the milestone dates of an issue
    ListFields {
        issue: String,

        /// Also list every populated field
        #[arg(short, long, default_value_t = false)]
        all: bool,
    },

    /// Look for references between two issues
    CheckLinks { first: String, second: String },

    /// Exit successfully when ISSUE mentions TARGET
    CheckReference { issue: String, target: String },

    /// Show the delivery issue auto sync would read for an idea
    FindLink { idea: String },

    /// Show recognized milestone names and, for a project, their field ids
    ShowMapping {
        #[arg(short = 'P', long)]
        project: Option<String>,
    },

    /// Verify the configured credentials
    TestConnection,
}

struct OutputSettings {
    format: OutputFormat,
    pretty: bool,
    path: Option<PathBuf>,
    quiet: bool,
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// File config with flags and environment layered on top.
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(url) = &self.url {
            config.jira.url = Some(url.clone());
        }
        if let Some(email) = &self.email {
            config.jira.email = Some(email.clone());
        }
        if let Some(token) = &self.token {
            config.jira.api_token = Some(token.clone());
        }
        if let Some(bearer) = &self.bearer {
            config.jira.bearer_token = Some(bearer.clone());
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.pretty {
            config.output.pretty = true;
        }
        if let Some(log_file) = &self.log_file {
            config.output.log_file = Some(log_file.clone());
        }

        Ok(config)
    }

    fn build_engine(config: &Config) -> Result<SyncEngine> {
        let credentials = config.jira.credentials()?;
        let client = JiraClient::new(credentials)
            .context("Failed to create Jira client")?
            .with_retry_policy(config.retry.policy())
            .with_min_interval(config.retry.min_interval());

        Ok(SyncEngine::new(
            client,
            FieldMapper::new(&config.sync.idea_issue_type),
            LinkResolver::new(&config.sync.link_type),
        )
        .with_ambiguity_policy(config.sync.ambiguous_links))
    }

    fn emit<T: Serialize + ?Sized>(settings: &OutputSettings, value: &T, print: impl FnOnce(&T)) -> Result<()> {
        match settings.format {
            OutputFormat::Json => output::write_json(value, settings.pretty, settings.path.as_deref()),
            OutputFormat::Summary => {
                if !settings.quiet {
                    print(value);
                }
                if let Some(path) = &settings.path {
                    output::write_json(value, settings.pretty, Some(path))?;
                }
                Ok(())
            }
        }
    }

    /// Live writes from an interactive summary session are confirmed first.
    fn needs_confirmation(&self, settings: &OutputSettings) -> bool {
        !self.dry_run && !self.force && !settings.quiet && settings.format == OutputFormat::Summary
    }

    /// Shows what a write would change and asks before doing it.
    fn confirm_preview(preview: &SyncResult) -> Result<bool> {
        if preview.fields_copied.is_empty() {
            return Ok(true);
        }
        output::print_sync_result(preview);
        let proceed = output::confirm("Proceed?")?;
        if !proceed {
            warn!("Cancelled; nothing was written to {}", preview.target_key);
        }
        Ok(proceed)
    }

    fn save_log(config: &Config, log: &ExecutionLog) -> Result<()> {
        if let Some(path) = &config.output.log_file {
            log.write_to(path)?;
        }
        Ok(())
    }

    pub async fn execute(&self) -> Result<ExitCode> {
        let config = self.load_config()?;
        let settings = OutputSettings {
            format: config.output.format,
            pretty: config.output.pretty,
            path: self.output.clone(),
            quiet: self.quiet,
        };

        if let Commands::ShowMapping { project: None } = &self.command {
            let report = MappingReport::recognized(&config.sync.link_type, &config.sync.idea_issue_type);
            Self::emit(&settings, &report, output::print_mapping)?;
            return Ok(ExitCode::SUCCESS);
        }

        let engine = Self::build_engine(&config)?;

        match &self.command {
            Commands::Sync { source, target } => {
                if self.needs_confirmation(&settings) {
                    let preview = engine.sync_one(source, target, true).await;
                    if !Self::confirm_preview(&preview)? {
                        return Ok(ExitCode::SUCCESS);
                    }
                }

                info!("Syncing {source} -> {target}");
                let result = engine.sync_one(source, target, self.dry_run).await;
                Self::emit(&settings, &result, output::print_sync_result)?;

                let mut log = ExecutionLog::new("sync");
                log.parameter("source", source)
                    .parameter("target", target)
                    .parameter("dry run", self.dry_run)
                    .record_sync(&result);
                Self::save_log(&config, &log)?;

                Ok(exit_code(result.status != SyncStatus::Failed))
            }

            Commands::AutoSync { idea } => {
                if self.needs_confirmation(&settings) {
                    let preview = engine.auto_sync(idea, true).await;
                    if !Self::confirm_preview(&preview)? {
                        return Ok(ExitCode::SUCCESS);
                    }
                }

                info!("Auto syncing {idea}");
                let result = engine.auto_sync(idea, self.dry_run).await;
                Self::emit(&settings, &result, output::print_sync_result)?;

                let mut log = ExecutionLog::new("auto-sync");
                log.parameter("idea", idea)
                    .parameter("dry run", self.dry_run)
                    .record_sync(&result);
                Self::save_log(&config, &log)?;

                Ok(exit_code(result.status != SyncStatus::Failed))
            }

            Commands::BulkSync { project, delay_ms } => {
                if self.needs_confirmation(&settings)
                    && !output::confirm(&format!("Sync milestone dates onto every idea of {project}?"))?
                {
                    warn!("Cancelled; nothing was written");
                    return Ok(ExitCode::SUCCESS);
                }

                let delay = delay_ms.map_or_else(|| config.bulk.delay(), Duration::from_millis);
                let cancel = CancelFlag::new();
                let flag = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupted, stopping after the current idea");
                        flag.cancel();
                    }
                });

                let progress = BulkProgressBar::start(project, self.quiet);
                let report = BulkDriver::new(&engine)
                    .with_delay(delay)
                    .bulk_sync(project, self.dry_run, &mut |p| progress.update(p), &cancel)
                    .await
                    .with_context(|| format!("Failed to list ideas of {project}"))?;
                progress.finish();

                Self::emit(&settings, &report, output::print_bulk_report)?;

                let mut log = ExecutionLog::new("bulk-sync");
                log.parameter("project", project)
                    .parameter("dry run", self.dry_run)
                    .parameter("delay ms", delay.as_millis())
                    .record_bulk(&report);
                Self::save_log(&config, &log)?;

                Ok(exit_code(!report.has_failures()))
            }

            Commands::ListFields { issue, all } => {
                let listing = engine
                    .list_fields(issue, *all)
                    .await
                    .with_context(|| format!("Failed to read fields of {issue}"))?;
                Self::emit(&settings, &listing, output::print_listing)?;
                Ok(ExitCode::SUCCESS)
            }

            Commands::CheckLinks { first, second } => {
                let checks = engine
                    .check_links(first, second)
                    .await
                    .with_context(|| format!("Failed to check references between {first} and {second}"))?;
                Self::emit(&settings, &checks[..], output::print_link_checks)?;

                let mut log = ExecutionLog::new("check-links");
                log.parameter("first", first).parameter("second", second);
                for check in &checks {
                    log.result(&format!("{} -> {}", check.issue, check.target), check.references.len());
                    for reference in &check.references {
                        log.detail(format!("{}: {}: {}", check.issue, reference.field, reference.excerpt));
                    }
                }
                Self::save_log(&config, &log)?;

                Ok(ExitCode::SUCCESS)
            }

            Commands::CheckReference { issue, target } => {
                let check = engine
                    .check_reference(issue, target)
                    .await
                    .with_context(|| format!("Failed to read {issue}"))?;
                Self::emit(&settings, &check, output::print_reference_check)?;
                Ok(exit_code(check.referenced))
            }

            Commands::FindLink { idea } => {
                let lookup = engine
                    .find_linked_issue(idea)
                    .await
                    .with_context(|| format!("Failed to find the delivery issue of {idea}"))?;
                Self::emit(&settings, &lookup, output::print_link_lookup)?;
                Ok(ExitCode::SUCCESS)
            }

            Commands::ShowMapping { project } => {
                let report = engine.show_mapping(project.as_deref()).await?;
                Self::emit(&settings, &report, output::print_mapping)?;
                Ok(ExitCode::SUCCESS)
            }

            Commands::TestConnection => {
                let me = engine
                    .test_connection()
                    .await
                    .context("Connection test failed")?;
                let base_url = engine.client().base_url().to_string();
                Self::emit(&settings, &me, |me| {
                    println!("{}", output::render_connection(&base_url, me));
                })?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_bulk_sync_with_global_flags() {
        let cli = Cli::try_parse_from([
            "jpd-sync",
            "bulk-sync",
            "IDEA",
            "--delay-ms",
            "1000",
            "--dry-run",
            "--format",
            "json",
            "-vv",
        ])
        .unwrap();

        assert!(cli.dry_run);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert_eq!(cli.verbosity(), 2);
        assert!(matches!(
            cli.command,
            Commands::BulkSync { ref project, delay_ms: Some(1000) } if project == "IDEA"
        ));
    }

    #[test]
    fn test_confirmation_only_for_interactive_live_writes() {
        let settings = |format| OutputSettings {
            format,
            pretty: false,
            path: None,
            quiet: false,
        };
        let parse = |args: &[&str]| Cli::try_parse_from(args.iter().copied()).unwrap();

        let live = parse(&["jpd-sync", "sync", "AV-1", "IDEA-1"]);
        assert!(live.needs_confirmation(&settings(OutputFormat::Summary)));
        assert!(!live.needs_confirmation(&settings(OutputFormat::Json)));

        let forced = parse(&["jpd-sync", "-y", "sync", "AV-1", "IDEA-1"]);
        assert!(!forced.needs_confirmation(&settings(OutputFormat::Summary)));

        let dry = parse(&["jpd-sync", "auto-sync", "IDEA-1", "--dry-run"]);
        assert!(!dry.needs_confirmation(&settings(OutputFormat::Summary)));
    }

    #[test]
    fn test_preview_without_changes_needs_no_answer() {
        let preview = SyncResult::skipped(Some("AV-1"), "IDEA-1", true, "nothing to copy");
        assert!(Cli::confirm_preview(&preview).unwrap());
    }

    #[test]
    fn test_parse_reference_commands() {
        let cli = Cli::try_parse_from(["jpd-sync", "check-reference", "IDEA-689", "AV-99599"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::CheckReference { ref issue, ref target } if issue == "IDEA-689" && target == "AV-99599"
        ));

        let cli = Cli::try_parse_from(["jpd-sync", "find-link", "IDEA-689", "--force"]).unwrap();
        assert!(cli.force);
        assert!(matches!(cli.command, Commands::FindLink { ref idea } if idea == "IDEA-689"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jpd-sync.toml");
        std::fs::write(
            &path,
            "[jira]\nurl = \"https://file.example.com\"\nemail = \"file@example.com\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "jpd-sync",
            "--config",
            path.to_str().unwrap(),
            "--url",
            "https://flag.example.com",
            "--pretty",
            "test-connection",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();

        assert_eq!(config.jira.url.as_deref(), Some("https://flag.example.com"));
        assert!(config.output.pretty);
    }
}
