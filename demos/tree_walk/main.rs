//! Builds an in-memory filesystem from a fixture file and prints its tree.

use std::path::{Path, PathBuf};

use clap::Parser;

use arbor_vfs::fixture::Fixture;
use arbor_vfs::memfs::MemFs;
use arbor_vfs::vfs::FileType;
use arbor_vfs::walk::{walk, Flow, WalkOptions};

const SAMPLE: &str = "\
docs/
docs/guide.md: 644 A short guide.
docs/api.md: Reference material.
src/
src/lib.rs: pub fn answer() -> u32 { 42 }
readme -> docs/guide.md
";

#[derive(Parser)]
#[command(name = "tree_walk", about = "Materialize a fixture and walk the resulting tree")]
struct Args {
    /// Fixture file describing the tree; a built-in sample is used when
    /// absent.
    fixture: Option<PathBuf>,

    /// Follow symlinks while walking.
    #[arg(long)]
    follow: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let text = match &args.fixture {
        Some(file) => std::fs::read_to_string(file)?,
        None => SAMPLE.to_owned(),
    };
    let fs = MemFs::new();
    Fixture::parse(&text)?.apply(&fs).await?;

    let options = WalkOptions { resolve_symlinks: args.follow };
    walk(&fs, Path::new("."), options, |virt, real, info, err| {
        if let Some(err) = err {
            println!("!    {}: {err}", virt.display());
            return Ok(Flow::Continue);
        }
        if let Some(info) = info {
            let tag = match info.file_type {
                FileType::Directory => "dir ",
                FileType::Symlink => "link",
                FileType::Regular => "file",
            };
            let mut line = format!("{tag} {:o} {:>6} {}", info.perm(), info.size, virt.display());
            if real != virt {
                line.push_str(&format!(" -> {}", real.display()));
            }
            println!("{line}");
        }
        Ok(Flow::Continue)
    })
    .await?;
    Ok(())
}
