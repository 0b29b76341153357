// src/core/shell.rs

//! Fork-exec of user-supplied shell snippets with a wall-clock ceiling,
//! used by `eval` and the map operator family.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

pub struct ShellOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

pub enum ShellError {
    Timeout,
    Io(std::io::Error),
    /// The command exited non-zero; carries its captured output.
    NonZeroExit(ShellOutput),
}

impl From<std::io::Error> for ShellError {
    fn from(e: std::io::Error) -> Self {
        ShellError::Io(e)
    }
}

pub enum ShellStdin {
    Null,
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// Runs `bash -c "set -eou pipefail; <script>"` in `cwd`, with `env`
/// exported and `stdin` wired as specified, killing the child if it runs
/// past `timeout`.
pub async fn run(
    script: &str,
    cwd: &Path,
    env: &[(&str, &str)],
    stdin: ShellStdin,
    timeout: Duration,
) -> Result<ShellOutput, ShellError> {
    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(format!("set -eou pipefail; {script}"))
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        cmd.env(key, value);
    }

    let pipe_bytes = match &stdin {
        ShellStdin::Null => {
            cmd.stdin(Stdio::null());
            None
        }
        ShellStdin::File(path) => {
            let file = std::fs::File::open(path)?;
            cmd.stdin(Stdio::from(file));
            None
        }
        ShellStdin::Bytes(data) => {
            cmd.stdin(Stdio::piped());
            Some(data.clone())
        }
    };

    let mut child = cmd.spawn()?;

    if let Some(data) = pipe_bytes {
        let mut stdin_handle = child.stdin.take().expect("stdin was piped");
        tokio::spawn(async move {
            let _ = stdin_handle.write_all(&data).await;
        });
    }

    let mut stdout_handle = child.stdout.take().expect("stdout was piped");
    let mut stderr_handle = child.stderr.take().expect("stderr was piped");
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_handle.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_handle.read_to_end(&mut buf).await;
        buf
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(result) => result?,
        Err(_) => {
            let _ = child.kill().await;
            return Err(ShellError::Timeout);
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();
    let output = ShellOutput { stdout, stderr };
    if status.success() {
        Ok(output)
    } else {
        Err(ShellError::NonZeroExit(output))
    }
}
