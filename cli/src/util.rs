use std::{
    path::{Path, PathBuf},
    process::exit,
};

pub fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| {
        eprintln!("Failed to get current dir: {}", e);
        exit(1);
    })
}

/// `dir` if given, otherwise the current dir.
pub fn work_dir(dir: Option<&Path>) -> PathBuf {
    dir.map(Path::to_owned).unwrap_or_else(current_dir)
}
