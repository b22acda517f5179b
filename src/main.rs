use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use benchwarden::analysis::Classification;
use benchwarden::case::CaseSet;
use benchwarden::cli::{Cli, ReportFormat};
use benchwarden::history::{HistoryStore, JsonHistory, MemoryHistory};
use benchwarden::orchestrator::{
    OrchestratorConfig, RunOrchestrator, RunRegistry, RunnerMap, Trigger,
};
use benchwarden::report::OverallStatus;
use benchwarden::resolver::DirectoryResolver;
use benchwarden::runner::ProcessRunner;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load configuration, applying CLI overrides on top of the file
fn load_config(args: &Cli) -> Result<OrchestratorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config `{}`", path.display()))?;
            OrchestratorConfig::from_toml(&raw)
                .with_context(|| format!("failed to parse config `{}`", path.display()))?
        }
        None => OrchestratorConfig::default(),
    };

    if let Some(repetitions) = args.repetitions {
        config.repetitions = repetitions;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.case_timeout_secs = timeout_secs;
    }

    Ok(config)
}

/// Resolve the case subset requested on the command line
fn requested_cases(args: &Cli, cases: &CaseSet) -> Result<Option<BTreeSet<String>>> {
    let mut requested: BTreeSet<String> = args.only.iter().cloned().collect();

    if let Some(pattern) = &args.tag {
        let matched = cases.filter(pattern)?;
        if matched.is_empty() {
            anyhow::bail!("no cases match tag filter `{pattern}`");
        }
        requested.extend(matched.into_iter().map(|case| case.id));
    }

    Ok(if requested.is_empty() {
        None
    } else {
        Some(requested)
    })
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let cases = CaseSet::load(&args.cases)?;
    if cases.is_empty() {
        anyhow::bail!("cases file `{}` defines no cases", args.cases.display());
    }

    let store: Arc<dyn HistoryStore> = match &args.history {
        Some(path) => Arc::new(JsonHistory::open(path)?),
        None => Arc::new(MemoryHistory::new()),
    };

    let trigger = Trigger {
        commit_ref: args.commit.clone(),
        requested_cases: requested_cases(&args, &cases)?,
        repetitions: args.repetitions,
    };

    let orchestrator = RunOrchestrator::new(
        config,
        cases,
        RunnerMap::with_default(Arc::new(ProcessRunner::new())),
        Box::new(DirectoryResolver::new(&args.artifact_dir)),
        store,
        Arc::new(RunRegistry::new()),
    )?;

    let report = match orchestrator.execute(&trigger) {
        Ok(report) => report,
        Err(e) => {
            // FAILED and cancelled runs emit a minimal status, never a report
            let failure = e.into_failure(&args.commit);
            match args.format {
                ReportFormat::Text => eprintln!("run failed: {}", failure.reason),
                ReportFormat::Json => println!("{}", failure.to_json()?),
            }
            std::process::exit(2);
        }
    };

    match args.format {
        ReportFormat::Text => print!("{}", report.render_text()),
        ReportFormat::Json => println!("{}", report.to_json()?),
    }

    let inconclusive = report
        .verdicts
        .iter()
        .filter(|v| v.classification == Classification::Inconclusive)
        .count();
    if inconclusive > 0 {
        tracing::warn!(inconclusive, "some case verdicts were inconclusive");
    }

    // Nonzero exit makes the report usable as a merge gate
    if report.overall_status == OverallStatus::Regression {
        std::process::exit(1);
    }
    Ok(())
}
