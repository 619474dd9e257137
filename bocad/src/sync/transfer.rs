use std::{
    io,
    path::{Path, PathBuf},
};

use boca_core::{BocaError, ByteStream};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("download failed: {0}")]
    Api(#[from] BocaError),
    #[error("I/O error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Writes the stream next to `target` and renames it into place once it is fully on disk.
pub async fn stream_to_path(mut stream: ByteStream, target: &Path) -> Result<u64, TransferError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| TransferError::Io { path, source }
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_err(parent))?;
    }
    let partial = partial_path(target);
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(io_err(&partial))?;
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err.into());
            }
        };
        file.write_all(&chunk).await.map_err(io_err(&partial))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(io_err(&partial))?;
    file.sync_all().await.map_err(io_err(&partial))?;
    drop(file);

    tokio::fs::rename(&partial, target)
        .await
        .map_err(io_err(target))?;
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
