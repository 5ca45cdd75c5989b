//! Running external tools

use mlinfer_core::{MlinferError, MlinferResult};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Render a command line for logs and error messages
pub fn describe(command: &Command) -> String {
    let std = command.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command, echoing its stdout and stderr line by line to our stdout.
///
/// Blocks the calling task until the process exits. A non-zero exit status
/// is an error.
pub async fn run_streaming(command: Command) -> MlinferResult<()> {
    run_streaming_to(command, tokio::io::stdout()).await
}

/// Run a command, echoing its stdout and stderr line by line into `sink`
pub async fn run_streaming_to<W>(mut command: Command, sink: W) -> MlinferResult<()>
where
    W: AsyncWrite + Unpin,
{
    let command_line = describe(&command);
    info!(command = %command_line, "Running command");

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| {
        MlinferError::Process(format!("Failed to spawn '{}': {}", command_line, e))
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let sink = Mutex::new(sink);

    let (status, out, err) = tokio::join!(
        child.wait(),
        echo_lines(stdout, &sink),
        echo_lines(stderr, &sink)
    );
    out?;
    err?;

    check_status(&command_line, status?)
}

/// Run a command with inherited stdio and wait for it to exit
pub async fn run_inherited(mut command: Command) -> MlinferResult<()> {
    let command_line = describe(&command);
    info!(command = %command_line, "Running command");

    let status = command.status().await.map_err(|e| {
        MlinferError::Process(format!("Failed to spawn '{}': {}", command_line, e))
    })?;

    check_status(&command_line, status)
}

async fn echo_lines<R, W>(reader: Option<R>, sink: &Mutex<W>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(reader) = reader {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let mut sink = sink.lock().await;
            sink.write_all(line.as_bytes()).await?;
            sink.write_all(b"\n").await?;
            sink.flush().await?;
        }
    }
    Ok(())
}

fn check_status(command_line: &str, status: ExitStatus) -> MlinferResult<()> {
    if status.success() {
        debug!(command = %command_line, "Command finished");
        Ok(())
    } else {
        Err(MlinferError::Process(format!(
            "'{}' exited with {}",
            command_line, status
        )))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_describe() {
        let cmd = sh("echo hi");
        assert_eq!(describe(&cmd), "sh -c echo hi");
    }

    #[tokio::test]
    async fn test_run_streaming_success() {
        run_streaming(sh("echo building; echo warning >&2"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_streaming_echoes_both_streams() {
        let mut output = Vec::new();
        run_streaming_to(
            sh("echo one; echo two; echo warn-a >&2; echo warn-b >&2; echo three"),
            &mut output,
        )
        .await
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 5);

        let position = |needle: &str| lines.iter().position(|line| *line == needle).unwrap();
        assert!(position("one") < position("two"));
        assert!(position("two") < position("three"));
        assert!(position("warn-a") < position("warn-b"));
    }

    #[tokio::test]
    async fn test_run_streaming_failure_keeps_output() {
        let mut output = Vec::new();
        let result = run_streaming_to(sh("echo step; exit 3"), &mut output).await;

        assert!(result.is_err());
        assert_eq!(output, b"step\n");
    }

    #[tokio::test]
    async fn test_run_streaming_failure() {
        let err = run_streaming(sh("echo step; exit 3")).await.unwrap_err();
        match err {
            MlinferError::Process(msg) => assert!(msg.contains("exited with")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_run_streaming_missing_program() {
        let result = run_streaming(Command::new("/nonexistent/tool")).await;
        assert!(matches!(result, Err(MlinferError::Process(_))));
    }

    #[tokio::test]
    async fn test_run_inherited() {
        assert!(run_inherited(sh("true")).await.is_ok());
        assert!(run_inherited(sh("false")).await.is_err());
    }
}
