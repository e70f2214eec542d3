//! Subprocess output draining

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::deploy::hub::LogHub;
use crate::errors::BerthError;
use crate::models::log::LogType;
use crate::models::project::ProjectId;

/// Append-only log file shared by the readers of one process
#[derive(Clone)]
pub struct LogSink {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl LogSink {
    pub async fn open(path: &Path) -> Result<Self, BerthError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `bytes`. Written data is visible to other readers on return.
    pub async fn write(&self, bytes: &[u8]) {
        let mut file = self.file.lock().await;
        let result = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!("Failed to write {}: {}", self.path.display(), e);
        }
    }

    pub async fn write_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        if !line.ends_with('\n') {
            bytes.push(b'\n');
        }
        self.write(&bytes).await;
    }

    pub async fn flush(&self) {
        let mut file = self.file.lock().await;
        if let Err(e) = file.flush().await {
            debug!("Failed to flush {}: {}", self.path.display(), e);
        }
    }
}

/// Bytes requested per read from a child's pipe
const READ_CHUNK: usize = 8 * 1024;

/// Drains `reader` into `sink` and the hub, tagged `log_type`.
///
/// Every read is forwarded as soon as it arrives: the raw bytes go to the
/// file, and the text is published split into lines. Text not yet terminated
/// by a newline is published as is, so prompts and progress output are not
/// held back. Lines keep the order of the underlying stream.
pub fn pipe_lines<R>(
    mut reader: R,
    project_id: ProjectId,
    log_type: LogType,
    sink: LogSink,
    hub: Arc<LogHub>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut splitter = LineSplitter::default();
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    sink.write(&chunk[..n]).await;
                    for line in splitter.feed(&chunk[..n]) {
                        hub.publish(project_id, log_type, line);
                    }
                }
                Err(e) => {
                    debug!("{} stream of project {} closed: {}", log_type, project_id, e);
                    break;
                }
            }
        }
        if let Some(rest) = splitter.finish() {
            hub.publish(project_id, log_type, rest);
        }
        sink.flush().await;
    })
}

/// Splits a byte stream into lines on `\n`, `\r\n` and lone `\r`.
///
/// A UTF-8 sequence cut by a chunk boundary is carried over to the next
/// chunk; any other invalid UTF-8 is replaced rather than dropped.
#[derive(Debug, Default)]
struct LineSplitter {
    carry: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = std::mem::take(&mut self.carry);

        for &byte in bytes {
            let after_cr = std::mem::replace(&mut self.after_cr, byte == b'\r');
            match byte {
                b'\n' if after_cr => {}
                b'\n' | b'\r' => lines.push(std::mem::take(&mut current)),
                _ => current.push(byte),
            }
        }

        if let Err(e) = std::str::from_utf8(&current) {
            if e.error_len().is_none() {
                self.carry = current.split_off(e.valid_up_to());
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }

        lines
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Whatever is still carried once the stream ended
    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.carry);
        (!rest.is_empty()).then(|| String::from_utf8_lossy(&rest).into_owned())
    }
}
