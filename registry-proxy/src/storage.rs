//! Small async filesystem helpers shared by ingestion and request handling.

use std::path::Path;

use tokio::fs;
use tracing::debug;

/// Save file content to the specified path, creating parent directories as
/// needed.
pub async fn save_file<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> std::io::Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = content.as_ref();
    fs::write(path, content).await?;
    debug!(path = %path.display(), size = content.len(), "File saved");
    Ok(())
}

/// Open a file for streaming and report its length, so the response can carry
/// an accurate `Content-Length` without ever buffering the body.
pub async fn open_for_streaming<P: AsRef<Path>>(path: P) -> std::io::Result<(fs::File, u64)> {
    let file = fs::File::open(path.as_ref()).await?;
    let len = file.metadata().await?.len();
    Ok((file, len))
}
