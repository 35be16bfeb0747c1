use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use regflow_application::{
    CodeExtractor, MailboxCodeRetriever, MailboxPoller, SessionOrchestrator, StepExecutor,
    build_workflow,
};
use regflow_core::config::AppConfig;
use regflow_core::relay::SelectionPolicy;
use regflow_core::{Identity, MailboxCredentials};
use regflow_execution::{AttemptTracker, BatchExecutor, BatchSummary, init_tracing};
use regflow_infrastructure::identity_source::load_identities;
use regflow_infrastructure::relay_list::load_relays;
use regflow_infrastructure::{ConfigService, EgressPool, FileResultSink, IdentityFactory};
use regflow_interaction::{HttpTransport, ImapConnector};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// `email:password` list; each identity reads codes from its own mailbox
    #[arg(long, conflicts_with = "count")]
    pub identities: Option<PathBuf>,

    /// Generate this many identities from the configured names and domains
    #[arg(long)]
    pub count: Option<usize>,

    /// Relay list file (overrides relay.file)
    #[arg(long)]
    pub relays: Option<PathBuf>,

    /// Relay selection policy: round-robin or random
    #[arg(long, value_parser = parse_policy)]
    pub policy: Option<SelectionPolicy>,

    /// Refuse to run without at least one relay
    #[arg(long)]
    pub require_relays: bool,

    /// Flows running at the same time (overrides batch.concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Whole-flow attempts per identity (overrides batch.max_attempts)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Completed identities are appended here (overrides batch.output)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

fn parse_policy(value: &str) -> Result<SelectionPolicy, String> {
    value.parse()
}

pub async fn run(args: RunArgs) -> Result<()> {
    init_tracing(&args.log_level, args.json_logs)?;

    let service = ConfigService::resolve(args.config.clone())?;
    let mut config = service.load()?;
    apply_overrides(&mut config, &args);
    ConfigService::validate(&config)?;

    let factory = IdentityFactory::from_config(&config.identity)?;
    let (identities, skipped_inputs) = collect_identities(&config, &factory, &args)?;
    if identities.is_empty() {
        anyhow::bail!("no identities to run");
    }

    let orchestrator = build_orchestrator(&config)?;
    let tracker = Arc::new(AttemptTracker::from_config(&config.batch));
    let batch = BatchExecutor::new(Arc::new(orchestrator))
        .with_concurrency(config.batch.concurrency)
        .with_max_attempts(config.batch.max_attempts)
        .with_tracker(tracker);

    let summary = batch
        .run(identities)
        .await
        .with_skipped_inputs(skipped_inputs);
    print_summary(&summary, &config);

    if summary.succeeded == 0 && summary.total() > 0 {
        anyhow::bail!("no flow completed");
    }
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    if let Some(relays) = &args.relays {
        config.relay.file = Some(relays.clone());
    }
    if let Some(policy) = args.policy {
        config.relay.policy = policy;
    }
    if args.require_relays {
        config.relay.required = true;
    }
    if let Some(concurrency) = args.concurrency {
        config.batch.concurrency = concurrency;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.batch.max_attempts = max_attempts;
    }
    if let Some(output) = &args.output {
        config.batch.output = output.clone();
    }
}

fn collect_identities(
    config: &AppConfig,
    factory: &IdentityFactory,
    args: &RunArgs,
) -> Result<(Vec<Identity>, usize)> {
    if let Some(path) = &args.identities {
        let list = load_identities(path)
            .with_context(|| format!("Failed to read identity list {}", path.display()))?;
        let identities = list
            .entries
            .iter()
            .map(|entry| factory.for_listed(entry))
            .collect();
        return Ok((identities, list.skipped));
    }

    let count = args
        .count
        .context("pass either --identities <file> or --count <n>")?;
    ConfigService::validate_for_generation(config)?;
    let identities = (0..count)
        .map(|_| factory.generate())
        .collect::<regflow_core::Result<Vec<_>>>()?;
    Ok((identities, 0))
}

fn build_orchestrator(config: &AppConfig) -> Result<SessionOrchestrator> {
    let relays = match &config.relay.file {
        Some(path) => {
            let list = load_relays(path, &config.relay.scheme)
                .with_context(|| format!("Failed to read relay list {}", path.display()))?;
            if list.skipped > 0 {
                tracing::warn!(skipped = list.skipped, "Some relay lines were skipped");
            }
            list.endpoints
        }
        None => Vec::new(),
    };
    let pool = Arc::new(EgressPool::build(
        relays,
        config.relay.policy,
        config.relay.required,
    )?);
    let transport = Arc::new(HttpTransport::new(pool, config.transport.timeout())?);

    let connector = Arc::new(ImapConnector::new(Some(config.mailbox.port)));
    let poller = MailboxPoller::new(connector);
    let extractor = Arc::new(CodeExtractor::new(&config.extractor)?);
    let shared: Option<MailboxCredentials> = config.mailbox.credentials();
    let retriever = MailboxCodeRetriever::new(poller, extractor, shared, config.mailbox.query_for(""))
        .with_initial_delay(config.mailbox.initial_delay());

    let table = Arc::new(build_workflow(config)?);
    tracing::info!(steps = table.steps().len(), "Workflow ready");

    Ok(SessionOrchestrator::new(
        table,
        StepExecutor::new(transport, config.endpoints.clone()),
        Arc::new(retriever),
        Arc::new(FileResultSink::new(config.batch.output.clone())),
    ))
}

fn print_summary(summary: &BatchSummary, config: &AppConfig) {
    println!("\n{}", "Batch summary".bold());
    println!("  {:<14} {}", "succeeded", summary.succeeded.to_string().green().bold());
    println!("  {:<14} {}", "failed", summary.failed.to_string().red().bold());
    if summary.rate_limited > 0 {
        println!("  {:<14} {}", "rate limited", summary.rate_limited.to_string().yellow());
    }
    if summary.skipped_inputs > 0 {
        println!("  {:<14} {}", "skipped lines", summary.skipped_inputs.to_string().yellow());
    }
    if summary.retries > 0 {
        println!("  {:<14} {}", "retries", summary.retries);
    }
    for (kind, count) in &summary.failures {
        println!("    {} {:<20} {}", "-".dimmed(), kind.to_string(), count);
    }
    println!("  {:<14} {:.1}s", "elapsed", summary.elapsed.as_secs_f64());
    if summary.succeeded > 0 {
        println!(
            "\n{} Completed identities appended to {}",
            "✓".green(),
            config.batch.output.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let harness = Harness::parse_from([
            "regflow",
            "--count",
            "2",
            "--relays",
            "relays.txt",
            "--policy",
            "random",
            "--require-relays",
            "--concurrency",
            "4",
            "--output",
            "out.txt",
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &harness.args);

        assert_eq!(config.relay.file, Some(PathBuf::from("relays.txt")));
        assert_eq!(config.relay.policy, SelectionPolicy::Random);
        assert!(config.relay.required);
        assert_eq!(config.batch.concurrency, 4);
        assert_eq!(config.batch.output, PathBuf::from("out.txt"));
        assert_eq!(config.batch.max_attempts, 1);
    }

    #[test]
    fn test_identities_and_count_conflict() {
        let parsed = Harness::try_parse_from([
            "regflow",
            "--identities",
            "ids.txt",
            "--count",
            "2",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_listed_identities_skip_malformed_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "a@example.com:pw1\nbroken\n\nb@example.com:pw2\n").unwrap();

        let harness = Harness::parse_from(["regflow", "--identities", path.to_str().unwrap()]);
        let config = AppConfig::default();
        let factory = IdentityFactory::from_config(&config.identity).unwrap();

        let (identities, skipped) = collect_identities(&config, &factory, &harness.args).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(identities.len(), 2);
        assert_eq!(
            identities[0].mailbox.as_ref().map(|m| m.username.as_str()),
            Some("a@example.com")
        );
    }

    #[test]
    fn test_missing_identity_source_is_error() {
        let harness = Harness::parse_from(["regflow"]);
        let config = AppConfig::default();
        let factory = IdentityFactory::from_config(&config.identity).unwrap();
        assert!(collect_identities(&config, &factory, &harness.args).is_err());
    }
}
