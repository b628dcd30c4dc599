//! Subprocess execution with line-level stdout/stderr multiplexing.
//!
//! In streaming mode each stream is pumped by its own task; every line
//! goes out as a tagged chunk and into one shared capture buffer. The
//! chunk queue closes only after both pumps have finished and the child
//! has been waited on, so a consumer draining it sees the complete run.

use std::{path::PathBuf, process::Stdio, sync::Arc, time::Instant};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, BufReader},
        process::Command,
        sync::{Mutex, mpsc},
    },
    tracing::{debug, warn},
};

use {runbox_registry::Plugin, runbox_store::RunStatus};

use crate::{args::split_args, error::Result, interpreter::resolve_command};

/// Execution mode for a plugin run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Capture output and emit line chunks on the caller's queue.
    Streaming,
    /// The child inherits the caller's stdio; nothing is captured.
    Interactive,
}

/// One line of subprocess output, tagged with its origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputChunk {
    pub plugin: String,
    pub data: String,
    pub is_err: bool,
}

/// Outcome of one subprocess execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub exit_code: i32,
    pub duration_ms: u64,
    pub status: RunStatus,
    /// Newline-joined captured output; empty in interactive mode.
    pub output: String,
}

/// Execution seam for plugins.
#[async_trait]
pub trait PluginRunner: Send + Sync {
    /// Run `plugin` with a raw argument string.
    ///
    /// Spawn and wait failures are reported as exit code 1, not as
    /// errors; the only error is an unsupported interpreter, raised
    /// before any subprocess exists.
    async fn run(
        &self,
        plugin: &Plugin,
        args: &str,
        mode: RunMode,
        output_tx: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<RunResult>;
}

/// Runner spawning real subprocesses against the managed runtime layout.
pub struct ProcessRunner {
    base_dir: PathBuf,
}

impl ProcessRunner {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl PluginRunner for ProcessRunner {
    async fn run(
        &self,
        plugin: &Plugin,
        args: &str,
        mode: RunMode,
        output_tx: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<RunResult> {
        let resolved = resolve_command(plugin, &self.base_dir)?;
        let start = Instant::now();

        let mut cmd = Command::new(&resolved.program);
        cmd.args(&resolved.args)
            .args(split_args(args))
            .current_dir(&plugin.source);
        for (key, value) in &resolved.env {
            cmd.env(key, value);
        }

        debug!(
            plugin = %plugin.name,
            program = %resolved.program.display(),
            args,
            "spawning plugin process"
        );

        let result = match (mode, output_tx) {
            (RunMode::Streaming, Some(tx)) => run_streaming(cmd, &plugin.name, tx, start).await,
            _ => run_interactive(cmd, start).await,
        };
        Ok(result)
    }
}

async fn run_streaming(
    mut cmd: Command,
    plugin_name: &str,
    tx: mpsc::Sender<OutputChunk>,
    start: Instant,
) -> RunResult {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(plugin = plugin_name, error = %e, "failed to spawn plugin process");
            return finish(1, start, String::new());
        },
    };

    let captured = Arc::new(Mutex::new(String::new()));
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(pump_lines(
            stdout,
            plugin_name.to_string(),
            false,
            tx.clone(),
            Arc::clone(&captured),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump_lines(
            stderr,
            plugin_name.to_string(),
            true,
            tx.clone(),
            Arc::clone(&captured),
        )));
    }

    for pump in pumps {
        let _ = pump.await;
    }
    let exit_code = wait_exit_code(&mut child).await;

    // Last sender standing: dropping it here closes the queue exactly
    // once, after both pumps finished and the child was reaped.
    drop(tx);

    let output = captured.lock().await.clone();
    finish(exit_code, start, output)
}

async fn run_interactive(mut cmd: Command, start: Instant) -> RunResult {
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "failed to spawn plugin process");
            return finish(1, start, String::new());
        },
    };
    let exit_code = wait_exit_code(&mut child).await;
    finish(exit_code, start, String::new())
}

/// Read `stream` line by line, emitting tagged chunks and appending to
/// the shared capture buffer.
async fn pump_lines<R>(
    stream: R,
    plugin: String,
    is_err: bool,
    tx: mpsc::Sender<OutputChunk>,
    captured: Arc<Mutex<String>>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = line.trim_end_matches('\n').trim_end_matches('\r');
                let chunk = OutputChunk {
                    plugin: plugin.clone(),
                    data: text.to_string(),
                    is_err,
                };
                // A gone receiver is fine; keep draining so the capture
                // buffer stays complete.
                let _ = tx.send(chunk).await;

                let mut buf = captured.lock().await;
                buf.push_str(text);
                buf.push('\n');
            },
            Err(e) => {
                debug!(error = %e, is_err, "plugin output stream closed");
                break;
            },
        }
    }
}

async fn wait_exit_code(child: &mut tokio::process::Child) -> i32 {
    match child.wait().await {
        // A clean exit reports its real status; anything else is 1.
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            warn!(error = %e, "failed to wait on plugin process");
            1
        },
    }
}

fn finish(exit_code: i32, start: Instant, output: String) -> RunResult {
    RunResult {
        exit_code,
        duration_ms: start.elapsed().as_millis() as u64,
        status: if exit_code == 0 { RunStatus::Success } else { RunStatus::Failed },
        output,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;

    use super::*;

    fn plant_stub(base: &Path, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let bin = base.join("core").join("python").join("venv").join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let stub = bin.join("python3");
        std::fs::write(&stub, script).unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn plugin(base: &Path) -> Plugin {
        let source = base.join("plugins").join("hello");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("hello.py"), "").unwrap();
        Plugin {
            name: "hello".to_string(),
            interpreter: "python".to_string(),
            description: String::new(),
            entry: "hello.py".to_string(),
            usage: String::new(),
            source,
            added_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn streaming_tags_chunks_and_captures_both_streams() {
        let tmp = tempfile::tempdir().unwrap();
        plant_stub(tmp.path(), "#!/bin/sh\necho \"a\"\necho \"b\" 1>&2\n");
        let plugin = plugin(tmp.path());
        let runner = ProcessRunner::new(tmp.path());

        let (tx, mut rx) = mpsc::channel(16);
        let collector = tokio::spawn(async move {
            let mut chunks = Vec::new();
            while let Some(chunk) = rx.recv().await {
                chunks.push(chunk);
            }
            chunks
        });

        let result = runner
            .run(&plugin, "", RunMode::Streaming, Some(tx))
            .await
            .unwrap();
        let chunks = collector.await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().any(|c| !c.is_err && c.data == "a" && c.plugin == "hello"));
        assert!(chunks.iter().any(|c| c.is_err && c.data == "b" && c.plugin == "hello"));

        let mut lines: Vec<&str> = result.output.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn arguments_reach_the_subprocess_split_and_unquoted() {
        let tmp = tempfile::tempdir().unwrap();
        // Echo the second user argument back (after the entry file at $1).
        plant_stub(tmp.path(), "#!/bin/sh\necho \"$3\"\n");
        let plugin = plugin(tmp.path());
        let runner = ProcessRunner::new(tmp.path());

        let (tx, mut rx) = mpsc::channel(16);
        let collector = tokio::spawn(async move {
            let mut chunks = Vec::new();
            while let Some(chunk) = rx.recv().await {
                chunks.push(chunk);
            }
            chunks
        });

        let result = runner
            .run(&plugin, "--name 'John Doe'", RunMode::Streaming, Some(tx))
            .await
            .unwrap();
        let chunks = collector.await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, "John Doe");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failed_result_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        plant_stub(tmp.path(), "#!/bin/sh\nexit 3\n");
        let plugin = plugin(tmp.path());
        let runner = ProcessRunner::new(tmp.path());

        let (tx, mut rx) = mpsc::channel(16);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let result = runner
            .run(&plugin, "", RunMode::Streaming, Some(tx))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn missing_runtime_reports_exit_code_one() {
        let tmp = tempfile::tempdir().unwrap();
        // No stub planted: the venv interpreter does not exist.
        let plugin = plugin(tmp.path());
        let runner = ProcessRunner::new(tmp.path());

        let (tx, mut rx) = mpsc::channel(16);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let result = runner
            .run(&plugin, "", RunMode::Streaming, Some(tx))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn unsupported_interpreter_never_spawns() {
        let tmp = tempfile::tempdir().unwrap();
        let mut plugin = plugin(tmp.path());
        plugin.interpreter = "ruby".to_string();
        let runner = ProcessRunner::new(tmp.path());

        let err = runner
            .run(&plugin, "", RunMode::Interactive, None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::RunnerError::UnsupportedInterpreter(ref s) if s == "ruby"));
    }

    #[tokio::test]
    async fn queue_closes_after_the_result_is_complete() {
        let tmp = tempfile::tempdir().unwrap();
        plant_stub(tmp.path(), "#!/bin/sh\necho one\necho two\n");
        let plugin = plugin(tmp.path());
        let runner = ProcessRunner::new(tmp.path());

        let (tx, mut rx) = mpsc::channel(16);
        let result = runner
            .run(&plugin, "", RunMode::Streaming, Some(tx))
            .await
            .unwrap();

        // The engine has returned, so the queue must already be closed;
        // buffered chunks are still delivered, then recv yields None.
        let mut seen = 0;
        while let Some(chunk) = rx.recv().await {
            assert!(!chunk.is_err);
            seen += 1;
        }
        assert_eq!(seen, 2);
        assert_eq!(result.output, "one\ntwo\n");
    }
}
