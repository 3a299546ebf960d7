//! The long-running dispatcher — `triage serve`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use triage::adapters::{GithubSource, MonitoringSource, SentrySource, SourceRegistry};
use triage::audit::AuditLog;
use triage::config::TriageConfig;
use triage::dispatch::Dispatcher;
use triage::exec::plan::StepKind;
use triage::exec::{CommandRunner, StepRunner};
use triage::notify::{LogSink, NotificationSink, WebhookSink};
use triage::server::start_server;

pub async fn cmd_serve(config_dir: &Path, port: Option<u16>) -> Result<()> {
    let config = TriageConfig::load(config_dir)?;

    let mut sources = SourceRegistry::new(config.sources.failure_threshold);
    sources.register(Arc::new(MonitoringSource::new()));
    if let Some(repo) = config.sources.github_repo.clone() {
        sources.register(Arc::new(GithubSource::new(
            repo,
            env_opt("TRIAGE_GITHUB_TOKEN"),
        )));
    }
    if let (Some(org), Some(project)) = (
        config.sources.sentry_org.clone(),
        config.sources.sentry_project.clone(),
    ) {
        sources.register(Arc::new(SentrySource::new(
            org,
            project,
            env_opt("TRIAGE_SENTRY_TOKEN"),
        )));
    }

    let audit = AuditLog::open(&config_dir.join(&config.audit.dir))?;

    let notifier: Arc<dyn NotificationSink> = match &config.notify_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone())),
        None => Arc::new(LogSink),
    };

    let mut commands = HashMap::new();
    for (name, command) in &config.exec.commands {
        let kind: StepKind = name
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid step kind in [exec.commands]: {e}"))?;
        commands.insert(kind, command.clone());
    }
    let runner: Arc<dyn StepRunner> = Arc::new(CommandRunner::new(commands));

    let port = port.unwrap_or(config.server.port);
    let dispatcher = Dispatcher::new(config, sources, audit, notifier, runner)?;

    let poller = dispatcher.clone();
    tokio::spawn(async move { poller.run_forever().await });

    info!(port, "dispatcher starting");
    start_server(dispatcher, port).await
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
