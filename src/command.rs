use std::ffi::OsStr;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Check that an external tool is installed and runs.
pub async fn check_tool(program: &str) -> std::io::Result<bool> {
    let output = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;
    Ok(output.status.success())
}

/// Run a tool to completion, capturing its output.
///
/// The child is killed if the returned future is dropped, so a timed-out or
/// cancelled stage does not leave the process behind.
pub async fn run_tool<I, S>(program: &str, args: I) -> std::io::Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!("Running {:?}", command.as_std());
    command.output().await
}

/// Last few lines of a tool's stderr, for error messages.
pub fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        let output = Output {
            status: ExitStatus::from_raw(256),
            stdout: Vec::new(),
            stderr: b"a\nb\n\nc\nd\ne\nf\ng\n".to_vec(),
        };
        assert_eq!(stderr_tail(&output), "c\nd\ne\nf\ng");
    }

    #[tokio::test]
    async fn test_missing_tool_is_io_error() {
        let result = run_tool("definitely-not-a-real-tool-4242", ["-version"]).await;
        assert!(result.is_err());
    }
}
