//! Upload sinks: disk (pre-allocated, bracket-sized buffers) or memory
//! (arena-style doubling buffers) (§4.4).

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::CoreError;

/// Buffer size policy: `optimal_buffer_size(file_size)` picks one of four
/// brackets (§4.4) so small uploads don't pay for a megabyte buffer and
/// large ones don't thrash with a 4 KB one.
pub fn optimal_buffer_size(expected_size: u64) -> usize {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if expected_size < 64 * KB {
        4 * 1024
    } else if expected_size < MB {
        64 * 1024
    } else if expected_size < 4 * MB {
        1024 * 1024
    } else {
        4 * 1024 * 1024
    }
}

/// Where an uploaded file's bytes are being written.
pub enum Sink {
    Disk {
        path: PathBuf,
        file: File,
        preallocated: bool,
    },
    Memory {
        buffers: Vec<Vec<u8>>,
        next_cap: usize,
    },
}

impl Sink {
    pub async fn disk(path: PathBuf, expected_size: Option<u64>) -> Result<Self, CoreError> {
        let mut file = File::create(&path)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to create upload file: {e}")))?;

        let preallocated = if let Some(size) = expected_size
            && size > 0
        {
            file.set_len(size)
                .await
                .map_err(|e| CoreError::Internal(format!("failed to preallocate: {e}")))?;
            file.seek(std::io::SeekFrom::Start(0))
                .await
                .map_err(|e| CoreError::Internal(e.to_string()))?;
            true
        } else {
            false
        };

        Ok(Sink::Disk {
            path,
            file,
            preallocated,
        })
    }

    pub fn memory() -> Self {
        Sink::Memory {
            buffers: Vec::new(),
            next_cap: 4 * 1024,
        }
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), CoreError> {
        match self {
            Sink::Disk { file, .. } => file
                .write_all(chunk)
                .await
                .map_err(|e| CoreError::Internal(format!("upload write failed: {e}"))),
            Sink::Memory { buffers, next_cap } => {
                let mut buf = Vec::with_capacity((*next_cap).max(chunk.len()));
                buf.extend_from_slice(chunk);
                buffers.push(buf);
                *next_cap = (*next_cap * 2).max(chunk.len());
                Ok(())
            }
        }
    }

    pub async fn finalize(&mut self) -> Result<(), CoreError> {
        match self {
            Sink::Disk { file, .. } => file
                .flush()
                .await
                .map_err(|e| CoreError::Internal(format!("upload flush failed: {e}"))),
            Sink::Memory { .. } => Ok(()),
        }
    }

    pub async fn fsync(&self) -> Result<(), CoreError> {
        match self {
            Sink::Disk { file, .. } => file
                .sync_all()
                .await
                .map_err(|e| CoreError::Internal(format!("fsync failed: {e}"))),
            Sink::Memory { .. } => Ok(()),
        }
    }

    /// Removes the temp artifact on failure (§4.4 "any temp artifact is
    /// removed").
    pub async fn cleanup(&self) {
        if let Sink::Disk { path, .. } = self {
            let _ = tokio::fs::remove_file(path).await;
        }
    }

    pub fn memory_bytes(&self) -> Vec<u8> {
        match self {
            Sink::Memory { buffers, .. } => buffers.concat(),
            Sink::Disk { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_brackets() {
        assert_eq!(optimal_buffer_size(1024), 4 * 1024);
        assert_eq!(optimal_buffer_size(100 * 1024), 64 * 1024);
        assert_eq!(optimal_buffer_size(2 * 1024 * 1024), 1024 * 1024);
        assert_eq!(optimal_buffer_size(10 * 1024 * 1024), 4 * 1024 * 1024);
    }

    #[tokio::test]
    async fn memory_sink_grows_by_doubling() {
        let mut sink = Sink::memory();
        sink.write(b"hello").await.unwrap();
        sink.write(b"world").await.unwrap();
        assert_eq!(sink.memory_bytes(), b"helloworld");
    }
}
