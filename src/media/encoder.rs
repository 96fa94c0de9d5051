//! External encoder process
//!
//! The encoder is any program that writes a raw Annex-B H.264 stream to
//! stdout. Its stderr is forwarded into the log.

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::EncoderConfig;
use crate::error::{AppError, Result};

/// A readable byte source that can be shut down
#[async_trait]
pub trait StreamSource: AsyncRead + Unpin + Send {
    /// Release the source; later calls are no-ops
    async fn close(&mut self) -> io::Result<()>;
}

/// Running encoder subprocess, readable as its stdout
pub struct EncoderProcess {
    session_id: u64,
    program: String,
    child: Child,
    stdout: ChildStdout,
    closed: bool,
}

impl EncoderProcess {
    /// Spawn the encoder with its arguments forwarded verbatim
    pub fn spawn(config: &EncoderConfig, session_id: u64) -> Result<Self> {
        info!(
            "[session {}] Starting encoder: {} {}",
            session_id,
            config.program,
            config.args.join(" ")
        );

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Encoder(format!("Failed to start {}: {}", config.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Encoder("encoder stdout not captured".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(session_id, stderr));
        }

        debug!("[session {}] Encoder PID {:?}", session_id, child.id());

        Ok(Self {
            session_id,
            program: config.program.clone(),
            child,
            stdout,
            closed: false,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

impl AsyncRead for EncoderProcess {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

#[async_trait]
impl StreamSource for EncoderProcess {
    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.child.try_wait()? {
            Some(status) => {
                debug!(
                    "[session {}] {} already exited: {}",
                    self.session_id, self.program, status
                );
            }
            None => {
                self.child.kill().await?;
                debug!("[session {}] {} killed", self.session_id, self.program);
            }
        }
        Ok(())
    }
}

async fn forward_stderr(session_id: u64, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!("[session {}] encoder: {}", session_id, line),
            Ok(None) => break,
            Err(e) => {
                warn!("[session {}] Error reading encoder stderr: {}", session_id, e);
                break;
            }
        }
    }
}
