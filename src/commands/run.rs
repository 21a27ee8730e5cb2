// ABOUTME: Run command implementation.
// ABOUTME: Resolves settings, takes the lock, runs hooks and the pipeline, reports the result.

use crate::cli::Cli;
use rolling_replacer::config::{FileConfig, Settings};
use rolling_replacer::diagnostics::{Diagnostics, Warning};
use rolling_replacer::error::{Error, Result};
use rolling_replacer::hooks::{HookContext, HookPoint, HookRunner};
use rolling_replacer::lock::{RunLock, default_state_dir};
use rolling_replacer::output::Output;
use rolling_replacer::pipeline::{DeploymentContext, PipelineRunner};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub async fn run(cli: Cli, output: &mut Output) -> Result<()> {
    output.start_timer();
    let cwd = env::current_dir()?;

    let (file, base_dir) = load_config(cli.config.as_deref(), &cwd)?;
    let settings = Settings::resolve(file, cli.overrides(), &base_dir)?;

    let context = DeploymentContext::new(
        cli.inactive_group,
        cli.inactive_target_group,
        cli.new_group,
        cli.new_target_group,
        cli.load_balancer,
    )?;

    let gateway = settings.gateway.open()?;
    let runner = PipelineRunner::for_strategy(
        cli.strategy,
        gateway,
        Arc::new(context.clone()),
        settings.poller(),
    );

    output.progress(&format!(
        "Running {} from {} to {} (poll every {}, wait limit {})",
        cli.strategy,
        context.inactive_group(),
        context.new_group(),
        humantime::format_duration(settings.poll_interval),
        settings.wait_limit
    ));

    let hook_runner = HookRunner::new(&cwd);
    let hook_context = HookContext::new(cli.strategy, context.clone());
    let mut diag = Diagnostics::default();

    run_hook(&hook_runner, HookPoint::PreRun, &hook_context, &mut diag).await?;

    let lock = if settings.lock {
        let state_dir = default_state_dir().ok_or_else(|| {
            Error::InvalidConfig("HOME is not set; set lock: false to run without a lock".into())
        })?;
        output.progress("  → Acquiring run lock...");
        let run_limit = cli.strategy.run_limit(settings.wait_limit);
        Some(RunLock::acquire(&state_dir, &context, run_limit, cli.force).await?)
    } else {
        None
    };

    let outcome = tokio::select! {
        report = runner.run(output, &mut diag) => report.into_result().map(|_| ()),
        _ = tokio::signal::ctrl_c() => Err(Error::Interrupted {
            step: runner.current_step().map(str::to_string),
        }),
    };

    if let Some(lock) = lock
        && let Err(e) = lock.release().await
    {
        diag.warn(Warning::lock_release(e.to_string()));
    }

    match &outcome {
        Ok(()) => run_hook(&hook_runner, HookPoint::PostRun, &hook_context, &mut diag).await?,
        Err(e) => {
            let context = match e {
                Error::PipelineFailed { step, .. }
                | Error::Interrupted { step: Some(step) } => {
                    hook_context.clone().with_failed_step(step)
                }
                _ => hook_context.clone(),
            };
            run_hook(&hook_runner, HookPoint::OnError, &context, &mut diag).await?;
        }
    }

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    outcome?;
    output.success(&format!("{} complete", cli.strategy));
    Ok(())
}

/// Run the hook at `point`, if present. Failure aborts at fatal points and
/// is collected as a warning elsewhere.
async fn run_hook(
    runner: &HookRunner,
    point: HookPoint,
    context: &HookContext,
    diag: &mut Diagnostics,
) -> Result<()> {
    if let Some(result) = runner.run(point, context).await
        && !result.success
    {
        let message = result.describe(point);
        if point.is_fatal() {
            return Err(Error::Hook(message));
        }
        diag.warn(Warning::hook(message));
    }
    Ok(())
}

/// The explicit `--config` file, else a discovered one, else defaults.
fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<(FileConfig, PathBuf)> {
    if let Some(path) = explicit {
        let config = FileConfig::load(path)?;
        return Ok((config, config_dir(path, cwd)));
    }

    match FileConfig::discover(cwd)? {
        Some((path, config)) => {
            tracing::debug!("using config {}", path.display());
            Ok((config, config_dir(&path, cwd)))
        }
        None => Ok((FileConfig::default(), cwd.to_path_buf())),
    }
}

/// Directory the config's relative paths are resolved against.
fn config_dir(path: &Path, cwd: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if path.ends_with(".rolling-replacer/config.yml") => {
            dir.parent().map_or_else(|| cwd.to_path_buf(), |d| cwd.join(d))
        }
        Some(dir) => cwd.join(dir),
        None => cwd.to_path_buf(),
    }
}
