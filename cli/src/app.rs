//! Assembles the engine from configuration and drives the CLI commands.

use std::sync::Arc;

use spector_backends::reasoner::HttpReasoner;
use spector_backends::session;
use spector_core::api::{
    AppConfig, CliError, Input, Orchestrator, Run, Scheduler, VerificationRequest,
    VerificationStatus,
};

use crate::commands::cli::{parse_input_pairs, BatchArgs, RunArgs};
use crate::registry::{RequirementSpec, SetupSpec};

pub struct Engine {
    pub scheduler: Arc<Scheduler>,
}

pub fn build_engine(cfg: &AppConfig) -> Result<Engine, CliError> {
    let backend = session::from_config(&cfg.backend);
    let reasoner = Arc::new(
        HttpReasoner::new(&cfg.model).map_err(|e| CliError::Config(e.to_string()))?,
    );
    let orchestrator = Arc::new(Orchestrator::new(
        backend,
        reasoner,
        cfg.orchestrator.clone(),
    ));
    Ok(Engine {
        scheduler: Arc::new(Scheduler::new(orchestrator, &cfg.scheduler)),
    })
}

pub async fn handle_run(args: RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    if let Some(budget) = args.step_budget {
        cfg.orchestrator.step_budget = budget;
    }
    let spec = RequirementSpec::load(&args.requirement)
        .map_err(|e| CliError::Config(format!("requirement file: {e}")))?;
    let pairs = parse_input_pairs(&args.input).map_err(CliError::Config)?;
    let mut input = Input::new();
    for (key, value) in pairs {
        input = input.with(key, value);
    }

    let engine = build_engine(&cfg)?;
    let run = engine
        .scheduler
        .submit(VerificationRequest {
            requirement: spec.to_requirement(),
            input,
            start_url: args.url,
        })
        .await_result()
        .await;

    print_run_report(&run);
    Ok(exit_code_for(&run))
}

pub async fn handle_batch(args: BatchArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let spec =
        SetupSpec::load(&args.setup).map_err(|e| CliError::Config(format!("setup file: {e}")))?;
    let input = spec.input();
    let requests: Vec<VerificationRequest> = spec
        .requirements
        .iter()
        .map(|r| VerificationRequest {
            requirement: r.to_requirement(),
            input: input.clone(),
            start_url: spec.start_url.clone(),
        })
        .collect();

    let engine = build_engine(&cfg)?;
    let runs = engine.scheduler.run_batch(requests).await;

    println!(
        "Setup '{}': {} requirement(s) verified",
        spec.name,
        runs.len()
    );
    let mut worst = 0;
    for run in &runs {
        print_run_report(run);
        worst = worst.max(exit_code_for(run));
    }
    Ok(worst)
}

pub fn print_run_report(run: &Run) {
    println!();
    println!(
        "{} [{}] {:?} / {:?} in {} step(s){}",
        run.requirement.title,
        run.id,
        run.status,
        run.overall(),
        run.trajectory.len(),
        run.elapsed_s()
            .map(|s| format!(", {s:.1}s"))
            .unwrap_or_default(),
    );
    if let Some(error) = run.error.as_deref() {
        println!("  error: {error} (last step: {:?})", run.last_step);
    }
    for verdict in &run.verdicts {
        println!(
            "  {} {:?}: {}",
            verdict.criterion_name, verdict.status, verdict.feedback
        );
    }
}

fn exit_code_for(run: &Run) -> i32 {
    match run.status {
        spector_core::api::RunStatus::Completed => match run.overall() {
            VerificationStatus::Met => 0,
            VerificationStatus::PartiallyMet | VerificationStatus::Unmet => 1,
            VerificationStatus::Error => 2,
        },
        spector_core::api::RunStatus::Cancelled => 3,
        _ => 2,
    }
}
