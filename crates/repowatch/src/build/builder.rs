//! Image build-and-push capability.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::error::{BuildError, Result};

/// Lines of stderr kept for the error message of a failed step.
const ERROR_TAIL_LINES: usize = 20;

/// Builds an image from a checkout and publishes it.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// `context` and `dockerfile` are absolute paths.
    async fn build_and_push(&self, context: &Path, dockerfile: &Path, image: &str) -> Result<()>;
}

/// Runs `docker build` then `docker push`, each under its own timeout.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: OsString,
    leading_args: Vec<OsString>,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(timeout: Duration) -> Self {
        Self::with_command("docker", Vec::<OsString>::new(), timeout)
    }

    /// Uses `program leading_args...` in place of `docker`.
    pub fn with_command(
        program: impl Into<OsString>,
        leading_args: impl IntoIterator<Item = impl Into<OsString>>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    async fn run_step(&self, step: &'static str, args: &[&OsStr]) -> Result<()> {
        let context = format!("Failed to run {}", self.program.to_string_lossy());

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::Io {
                context: context.clone(),
                source: e,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (_, tail) = tokio::join!(
                stream_lines(stdout, step, 0),
                stream_lines(stderr, step, ERROR_TAIL_LINES)
            );
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, tail))
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok((status, _))) if status.success() => Ok(()),
            Ok(Ok((status, tail))) => {
                let detail = if tail.is_empty() {
                    status.to_string()
                } else {
                    Vec::from(tail).join("\n")
                };
                Err(BuildError::Execution { step, detail })
            }
            Ok(Err(e)) => Err(BuildError::Io { context, source: e }),
            Err(_) => {
                let _ = child.start_kill();
                Err(BuildError::Timeout {
                    step,
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Logs each line at debug level and returns the last `keep` lines.
async fn stream_lines<R>(reader: Option<R>, step: &str, keep: usize) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(keep);
    let Some(reader) = reader else {
        return tail;
    };

    // Raw bytes so a line that is not UTF-8 does not end the stream.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        tracing::debug!(step, "{}", line);
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
    tail
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build_and_push(&self, context: &Path, dockerfile: &Path, image: &str) -> Result<()> {
        tracing::info!(image, context = %context.display(), "Building image");
        self.run_step(
            "docker build",
            &[
                OsStr::new("build"),
                OsStr::new("-t"),
                OsStr::new(image),
                OsStr::new("-f"),
                dockerfile.as_os_str(),
                context.as_os_str(),
            ],
        )
        .await?;

        tracing::info!(image, "Pushing image");
        self.run_step("docker push", &[OsStr::new("push"), OsStr::new(image)])
            .await
    }
}
