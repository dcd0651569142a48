use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use super::error::ProcessError;

/// A fully-described subprocess invocation.
///
/// Environment entries are layered on top of the inherited environment;
/// callers that need a clean slate pass everything explicitly.
#[derive(Debug, Clone, Default)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }
}

pub type ProcessStreamItem = Result<String, ProcessError>;
pub type ProcessStreamFut = Pin<Box<dyn Stream<Item = ProcessStreamItem> + Send>>;

/// Live view of a running subprocess: line-oriented stdout/stderr streams
/// plus a future resolving to the final exit status.
pub struct ProcessStream {
    pub stdout: ProcessStreamFut,
    pub stderr: ProcessStreamFut,
    pub status: Pin<Box<dyn futures::Future<Output = Result<ExitStatus, ProcessError>> + Send>>,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
    async fn run_streaming(&self, command: ProcessCommand) -> Result<ProcessStream, ProcessError>;
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    fn normalize_line(mut line: String) -> String {
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        line
    }

    fn create_line_stream<R>(reader: tokio::io::BufReader<R>) -> ProcessStreamFut
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
    {
        use tokio::io::AsyncBufReadExt;

        Box::pin(futures::stream::unfold(reader, |mut reader| async move {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => None,
                Ok(_) => Some((Ok(Self::normalize_line(line)), reader)),
                Err(e) => Some((Err(ProcessError::Io(e)), reader)),
            }
        })) as ProcessStreamFut
    }

    fn convert_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::convert_signal_status(status)
        }
    }

    #[cfg(unix)]
    fn convert_signal_status(status: std::process::ExitStatus) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(signal) => ExitStatus::Signal(signal),
            None => ExitStatus::Error(1),
        }
    }

    #[cfg(not(unix))]
    fn convert_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
        ExitStatus::Error(1)
    }

    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);

        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd
    }

    fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(command.program.clone())
        } else {
            ProcessError::SpawnFailed {
                command: format!("{} {}", command.program, command.args.join(" ")),
                source: error,
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = std::time::Instant::now();
        tracing::debug!(
            "executing subprocess: {} {}",
            command.program,
            command.args.join(" ")
        );

        let mut cmd = Self::configure_command(&command);
        let child = cmd
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command))?;

        let output = child.wait_with_output().await.map_err(ProcessError::Io)?;
        let status = Self::convert_exit_status(output.status);
        let duration = start.elapsed();

        tracing::debug!(
            "subprocess finished in {:?} with status {:?}: {}",
            duration,
            status,
            command.program
        );

        Ok(ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        })
    }

    async fn run_streaming(&self, command: ProcessCommand) -> Result<ProcessStream, ProcessError> {
        use tokio::io::BufReader;

        tracing::debug!(
            "executing subprocess (streaming): {} {}",
            command.program,
            command.args.join(" ")
        );

        let mut cmd = Self::configure_command(&command);
        let mut child = cmd
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command))?;

        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::StreamCapture("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::StreamCapture("stderr"))?;

        let stdout_stream = Self::create_line_stream(BufReader::new(stdout));
        let stderr_stream = Self::create_line_stream(BufReader::new(stderr));

        let status = Box::pin(async move {
            let status = child.wait().await.map_err(ProcessError::Io)?;
            Ok(Self::convert_exit_status(status))
        });

        Ok(ProcessStream {
            stdout: stdout_stream,
            stderr: stderr_stream,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn normalize_line_strips_trailing_newlines() {
        assert_eq!(TokioProcessRunner::normalize_line("x\n".into()), "x");
        assert_eq!(TokioProcessRunner::normalize_line("x\r\n".into()), "x");
        assert_eq!(TokioProcessRunner::normalize_line("x".into()), "x");
        assert_eq!(TokioProcessRunner::normalize_line("".into()), "");
    }

    #[tokio::test]
    async fn run_captures_stdout_and_status() {
        let runner = TokioProcessRunner;
        let output = runner
            .run(
                ProcessCommand::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]),
            )
            .await
            .unwrap();

        assert_eq!(output.status, ExitStatus::Error(3));
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[tokio::test]
    async fn run_streaming_yields_lines_and_status() {
        let runner = TokioProcessRunner;
        let stream = runner
            .run_streaming(ProcessCommand::new("sh").args(["-c", "echo one; echo two"]))
            .await
            .unwrap();

        let lines: Vec<String> = stream.stdout.map(|l| l.unwrap()).collect().await;
        assert_eq!(lines, vec!["one", "two"]);

        let status = stream.status.await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn unknown_program_maps_to_command_not_found() {
        let runner = TokioProcessRunner;
        let err = runner
            .run(ProcessCommand::new("definitely-not-a-real-binary-4921"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::CommandNotFound(_)));
    }
}
