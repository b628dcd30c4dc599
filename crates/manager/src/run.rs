//! The run orchestration sequence.

use {
    thiserror::Error,
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

use {
    runbox_registry::RegistryError,
    runbox_runner::{Interpreter, OutputChunk, RunMode, RunnerError},
    runbox_store::{PluginState, RunRecord, RunStatus},
};

use crate::{service::PluginService, types::RunPluginResult};

/// Failures that abort a run before any subprocess outcome exists.
///
/// Everything else — nonzero exits, spawn failures, store trouble — is
/// reported through [`RunPluginResult`] or swallowed.
#[derive(Debug, Error)]
pub enum RunPluginError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl PluginService {
    /// Execute a plugin and record the run.
    ///
    /// The step order is fixed: registry lookup, best-effort usage
    /// update, pre-run `running` record, engine invocation, finalization.
    /// Store failures never block execution; only an unknown plugin or an
    /// unsupported interpreter abort the call.
    pub async fn run_plugin(
        &self,
        name: &str,
        args: &str,
        mode: RunMode,
        output_tx: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<RunPluginResult, RunPluginError> {
        // 1. An unknown plugin aborts before any state is touched.
        let plugin = self.repo.get(name).await?;

        let interpreter = Interpreter::parse(&plugin.interpreter)
            .map(|i| i.label().to_string())
            .unwrap_or_else(|_| plugin.interpreter.clone());

        // 2. Usage tracking is best-effort bookkeeping.
        match self.usage.read().await {
            Ok(mut stats) => {
                stats.record_run(name);
                if let Err(e) = self.usage.write(&stats).await {
                    debug!(plugin = name, error = %e, "usage update skipped");
                }
            },
            Err(e) => debug!(plugin = name, error = %e, "usage read skipped"),
        }

        // 3. Persist the run intent before spawning anything.
        let mut state = match self.state.read(name).await {
            Ok(state) => state,
            Err(e) => {
                warn!(plugin = name, error = %e, "state unreadable, starting fresh");
                PluginState::new(name)
            },
        };
        state.push_record(RunRecord::started(args));
        if let Err(e) = self.state.write(&state).await {
            debug!(plugin = name, error = %e, "pre-run state write failed");
        }

        // 4. Run.
        let run = match self.runner.run(&plugin, args, mode, output_tx).await {
            Ok(run) => run,
            Err(e) => {
                // Aborted runs are never finalized: the on-disk record
                // keeps its `running` status.
                if let Some(last) = state.history.last_mut() {
                    last.status = RunStatus::Failed;
                }
                return Err(e.into());
            },
        };

        // 5. Finalize the last-appended record in place.
        if let Some(last) = state.history.last_mut() {
            last.exit_code = run.exit_code;
            last.duration_ms = run.duration_ms;
            last.status = run.status;
        }
        if let Err(e) = self.state.write(&state).await {
            debug!(plugin = name, error = %e, "post-run state write failed");
        }

        let message = if run.exit_code != 0 {
            format!("Process exited with code {}", run.exit_code)
        } else {
            String::new()
        };

        Ok(RunPluginResult {
            plugin_name: plugin.name,
            args: args.to_string(),
            success: run.exit_code == 0,
            message,
            exit_code: run.exit_code,
            duration_ms: run.duration_ms,
            status: run.status.as_str().to_string(),
            interpreter,
            output: run.output,
        })
    }
}
