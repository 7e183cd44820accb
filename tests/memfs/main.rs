mod common;
mod containment;
mod directory_ops;
mod metadata_ops;
mod removal_ops;
mod symlink_ops;
mod walker;
