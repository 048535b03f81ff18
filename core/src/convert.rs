//! Audio format conversion through an external transcoder (ffmpeg by default).
//!
//! The source buffer is handed to the child's stdin and stdin is closed once
//! the buffer is written. Output is read lazily from the child's stdout via
//! [`ConvertedAudio`]; the exit status is only known after
//! [`ConvertedAudio::finish`].

use crate::config::ConverterConfig;
use crate::{Result, SpeechCacheError};
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct FormatConverter {
    cfg: ConverterConfig,
}

impl FormatConverter {
    pub fn new(cfg: ConverterConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.cfg
    }

    /// Spawns the transcoder and starts feeding `source` into it.
    /// Must be called from within a tokio runtime.
    pub fn convert(&self, source: Vec<u8>) -> Result<ConvertedAudio> {
        let program = self.cfg.program.to_string_lossy().to_string();

        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(target: "convert", command = ?cmd, bytes = source.len(), "Running converter");
        let mut child = cmd
            .spawn()
            .map_err(|e| SpeechCacheError::ConverterUnavailable {
                program: program.clone(),
                source: e,
            })?;

        let (mut stdin, stdout, mut stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(i), Some(o), Some(e)) => (i, o, e),
                _ => {
                    return Err(SpeechCacheError::Conversion(format!(
                        "{} started without piped stdio",
                        program
                    )))
                }
            };

        // stdin is dropped (closed) when the task ends
        let feeder = tokio::spawn(async move {
            stdin.write_all(&source).await?;
            stdin.flush().await
        });

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).trim().to_string()
        });

        Ok(ConvertedAudio {
            program,
            child,
            stdout,
            feeder,
            stderr: stderr_task,
        })
    }
}

/// Converted audio streamed from the transcoder's stdout.
pub struct ConvertedAudio {
    program: String,
    child: Child,
    stdout: ChildStdout,
    feeder: JoinHandle<io::Result<()>>,
    stderr: JoinHandle<String>,
}

impl ConvertedAudio {
    /// Waits for the transcoder to exit and reports whether the output read so
    /// far is complete. Call after reading the stream to EOF; any unread
    /// output is discarded.
    pub async fn finish(self) -> Result<()> {
        let ConvertedAudio {
            program,
            mut child,
            stdout,
            feeder,
            stderr,
        } = self;
        drop(stdout);

        let fed = feeder.await.map_err(|e| {
            SpeechCacheError::Conversion(format!("{} input task failed: {}", program, e))
        })?;
        let status = child.wait().await?;
        let stderr = stderr.await.unwrap_or_default();

        if !status.success() {
            warn!(target: "convert", program = %program, %status, stderr = %stderr, "Converter failed");
            return Err(SpeechCacheError::Conversion(if stderr.is_empty() {
                format!("{} exited with {}", program, status)
            } else {
                format!("{} exited with {}: {}", program, status, stderr)
            }));
        }
        if let Err(e) = fed {
            return Err(SpeechCacheError::Conversion(format!(
                "failed writing input to {}: {}",
                program, e
            )));
        }

        debug!(target: "convert", program = %program, "Converter finished");
        Ok(())
    }
}

impl AsyncRead for ConvertedAudio {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}
