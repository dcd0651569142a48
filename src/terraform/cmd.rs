use anyhow::{anyhow, Result};
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::subprocess::{ProcessCommand, ProcessRunner};

/// Shared writable sink for mirrored subprocess output.
pub type OutputSink = Arc<Mutex<dyn Write + Send>>;

pub fn sink<W: Write + Send + 'static>(writer: W) -> OutputSink {
    Arc::new(Mutex::new(writer))
}

/// Low-level terraform invocation wrapper.
///
/// Owns the diagnostic channel: the subprocess's stderr is captured there
/// on every run, debug or not, so a failed apply is always diagnosable.
/// Stdout is only surfaced to the caller's sink in debug mode; data
/// extraction goes through dedicated calls instead of scraping the stream.
pub struct Cmd {
    runner: Arc<dyn ProcessRunner>,
    stderr: OutputSink,
}

impl Cmd {
    pub fn new(runner: Arc<dyn ProcessRunner>, stderr: OutputSink) -> Self {
        Self { runner, stderr }
    }

    /// Run `terraform <args>` in `working_dir`.
    ///
    /// With `debug` set, stdout and stderr are mirrored live to the
    /// caller-provided sink and the diagnostic channel, preceded by the
    /// working directory for traceability. A non-zero exit maps to an
    /// error carrying the process status text.
    pub async fn run(
        &self,
        stdout: OutputSink,
        working_dir: &Path,
        args: &[String],
        debug: bool,
    ) -> Result<()> {
        if debug {
            let mut out = stdout.lock().unwrap();
            writeln!(out, "working directory: {}", working_dir.display())?;
        }

        let command = ProcessCommand::new("terraform")
            .args(args.iter().cloned())
            .current_dir(working_dir);

        let stream = self.runner.run_streaming(command).await?;

        let stdout_task = {
            let stdout = Arc::clone(&stdout);
            let mut lines = stream.stdout;
            async move {
                while let Some(line) = lines.next().await {
                    let line = line?;
                    if debug {
                        let mut out = stdout.lock().unwrap();
                        writeln!(out, "{line}")?;
                    }
                }
                Ok::<(), anyhow::Error>(())
            }
        };

        let stderr_task = {
            let stderr = Arc::clone(&self.stderr);
            let mut lines = stream.stderr;
            async move {
                while let Some(line) = lines.next().await {
                    let line = line?;
                    let mut err = stderr.lock().unwrap();
                    writeln!(err, "{line}")?;
                }
                Ok::<(), anyhow::Error>(())
            }
        };

        let (stdout_result, stderr_result, status) =
            futures::join!(stdout_task, stderr_task, stream.status);
        stdout_result?;
        stderr_result?;

        let status = status?;
        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(anyhow!("exit status {code}")),
                None => Err(anyhow!("terminated by signal")),
            }
        }
    }
}
