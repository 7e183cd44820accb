use std::path::Path;

use arbor_vfs::memfs::MemFs;
use arbor_vfs::util;
use arbor_vfs::vfs::Fs;

pub fn p(s: &str) -> &Path {
    Path::new(s)
}

pub async fn write(fs: &MemFs, path: &str, data: &[u8]) {
    util::write_file(fs, p(path), data, 0o644).await.expect("write fixture file");
}

pub async fn read(fs: &MemFs, path: &str) -> Vec<u8> {
    util::read_file(fs, p(path)).await.expect("read fixture file")
}

pub async fn dir_names(fs: &MemFs, path: &str) -> Vec<String> {
    let handle = fs.open(p(path)).await.expect("open directory");
    let names = handle.read_dir_names(None).await.expect("list directory");
    handle.close().await.expect("close directory");
    names
}
