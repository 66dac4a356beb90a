//! The encoder seam: one input stream plus a profile in, one output stream
//! plus a single success/failure outcome out.

use crate::common::profile::TranscodeProfile;
use crate::infrastructure::storage::ObjectReader;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::collections::VecDeque;
use std::io;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to start encoder: {0}")]
    Spawn(#[source] io::Error),

    #[error("Encoder {0} pipe unavailable")]
    Pipe(&'static str),

    #[error("Failed to feed input to encoder: {0}")]
    Input(#[source] io::Error),

    #[error("Encoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Encoder IO error: {0}")]
    Io(#[from] io::Error),
}

/// A running encode. Drain `stream` to the end, then await `completion`: the
/// output is only valid if `completion` resolves to `Ok`.
pub struct EncodeOutput {
    pub stream: BoxStream<'static, io::Result<Bytes>>,
    pub completion: BoxFuture<'static, Result<(), EncodeError>>,
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(
        &self,
        input: ObjectReader,
        profile: &TranscodeProfile,
    ) -> Result<EncodeOutput, EncodeError>;
}

/// Runs `ffmpeg` with the input on stdin and fragmented MP4 on stdout, so
/// neither side ever touches local disk.
pub struct FfmpegEncoder {
    ffmpeg_path: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn args(profile: &TranscodeProfile) -> Vec<String> {
        let size = profile.dimensions();
        [
            "-hide_banner",
            "-i", "pipe:0",
            "-s", size.as_str(),
            "-c:v", "libx264",
            "-preset", "medium",
            "-crf", "23",
            "-c:a", "aac",
            // Plain MP4 needs a seekable output for the moov atom.
            "-movflags", "frag_keyframe+empty_moov",
            "-f", "mp4",
            "-y",
            "pipe:1",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        mut input: ObjectReader,
        profile: &TranscodeProfile,
    ) -> Result<EncodeOutput, EncodeError> {
        let args = Self::args(profile);
        info!("FFmpeg command for {}: {} {}", profile.name, self.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EncodeError::Spawn)?;

        let mut stdin = child.stdin.take().ok_or(EncodeError::Pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(EncodeError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(EncodeError::Pipe("stderr"))?;

        let feeder = tokio::spawn(async move {
            let copied = tokio::io::copy(&mut input, &mut stdin).await;
            // Closing stdin is what tells ffmpeg the input is over.
            drop(stdin);
            copied
        });

        let profile_name = profile.name;
        let stderr_tail = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(profile = profile_name, "ffmpeg: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let completion = async move {
            let status = child.wait().await?;
            let fed = feeder.await.map_err(|e| EncodeError::Io(io::Error::other(e)))?;
            let stderr = stderr_tail.await.unwrap_or_default();

            if let Err(e) = fed {
                // A broken pipe after ffmpeg died is a symptom, not the cause.
                if status.success() || e.kind() != io::ErrorKind::BrokenPipe {
                    return Err(EncodeError::Input(e));
                }
            }

            if !status.success() {
                return Err(EncodeError::Failed {
                    status: status.to_string(),
                    stderr,
                });
            }

            Ok(())
        }
        .boxed();

        Ok(EncodeOutput {
            stream: ReaderStream::new(stdout).boxed(),
            completion,
        })
    }
}
