//! Live tailing of a growing log file
//!
//! The tailer blocks until the file exists, starts at the current end, and
//! then yields complete lines as they are appended. Both waits are bounded
//! polls with a configurable sleep; this is a long-running foreground
//! process, not a request-driven service, so there is no need for
//! filesystem event notification.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio::time::sleep;
use tracing::{info, warn};

/// Tails one append-only file, yielding complete lines in arrival order
pub struct LogTailer {
    path: PathBuf,
    reader: BufReader<File>,

    /// Byte offset of the next unread position in the file
    pos: u64,

    /// Sleep between reads at end-of-stream
    poll_interval: Duration,

    /// Partial line carried across reads until its newline arrives
    pending: String,
}

impl LogTailer {
    /// Block until `path` exists, then start tailing from its current end
    ///
    /// `wait_interval` spaces the existence checks; `poll_interval` spaces
    /// the end-of-stream reads once tailing.
    pub async fn wait_for(
        path: impl AsRef<Path>,
        wait_interval: Duration,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = loop {
            match File::open(&path).await {
                Ok(file) => break file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    info!(path = %path.display(), "waiting for log file to appear");
                    sleep(wait_interval).await;
                }
                Err(err) => return Err(err),
            }
        };

        let pos = file.seek(SeekFrom::End(0)).await?;
        info!(path = %path.display(), offset = pos, "tailing log file");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            pos,
            poll_interval,
            pending: String::new(),
        })
    }

    /// Return the next complete line, waiting for content as needed
    ///
    /// A trailing fragment without its newline yet is buffered, never
    /// returned early, so a line written in two chunks arrives whole. A
    /// shrunken file is treated as rotation and reopened from the start.
    pub async fn next_line(&mut self) -> io::Result<String> {
        loop {
            let read = self.reader.read_line(&mut self.pending).await?;

            if read == 0 {
                if self.was_truncated().await? {
                    self.reopen().await?;
                    continue;
                }
                sleep(self.poll_interval).await;
                continue;
            }

            self.pos += read as u64;

            if self.pending.ends_with('\n') {
                let line = self
                    .pending
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                self.pending.clear();
                return Ok(line);
            }
            // Incomplete tail fragment; keep accumulating
        }
    }

    /// Path of the tailed file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file shrank below our read position
    async fn was_truncated(&self) -> io::Result<bool> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len() < self.pos),
            // A missing file is not truncation; keep polling the old handle
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Reopen the file from offset zero after truncation
    async fn reopen(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            warn!(
                path = %self.path.display(),
                dropped = self.pending.len(),
                "discarding partial line lost to truncation"
            );
            self.pending.clear();
        }

        let file = File::open(&self.path).await?;
        info!(path = %self.path.display(), "log file truncated, reopening from start");
        self.reader = BufReader::new(file);
        self.pos = 0;
        Ok(())
    }
}
