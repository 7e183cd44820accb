//! Defines small convenience helpers layered over the [`Fs`] and
//! [`File`](crate::vfs::File) capabilities.

use std::path::Path;

use crate::vfs::{ErrorKind, Fs, OpenFlags, VfsError, VfsResult};

/// Reads the whole content of the file at `path`.
pub async fn read_file(fs: &dyn Fs, path: &Path) -> VfsResult<Vec<u8>> {
    let handle = fs.open(path).await?;
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match handle.read(&mut buf).await {
            Ok(n) => n,
            Err(err) => {
                let _ = handle.close().await;
                return Err(err);
            }
        };
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    handle.close().await?;
    Ok(out)
}

/// Reads the file at `path` as UTF-8 text.
pub async fn read_to_string(fs: &dyn Fs, path: &Path) -> VfsResult<String> {
    let bytes = read_file(fs, path).await?;
    String::from_utf8(bytes)
        .map_err(|_| VfsError::path("read", path.display().to_string(), ErrorKind::Invalid))
}

/// Creates or truncates the file at `path` and writes `data` to it.
pub async fn write_file(fs: &dyn Fs, path: &Path, data: &[u8], perm: u32) -> VfsResult<()> {
    let handle = fs.open_file(path, OpenFlags::create_truncate(), perm).await?;
    let mut written = 0;
    while written < data.len() {
        match handle.write(&data[written..]).await {
            Ok(n) => written += n,
            Err(err) => {
                let _ = handle.close().await;
                return Err(err);
            }
        }
    }
    handle.close().await
}

/// Reports whether `path` names an existing entry, following symlinks.
pub async fn exists(fs: &dyn Fs, path: &Path) -> VfsResult<bool> {
    match fs.stat(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
