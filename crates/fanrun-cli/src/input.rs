//! Loading the command batch from a file or stdin.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use fanrun_core::batch::parse_batch;

/// Read the batch from `path`, or from stdin when `path` is `None` or `-`.
pub fn load_batch(path: Option<&Path>) -> Result<Vec<Vec<String>>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)
                .with_context(|| format!("failed to open command file {}", path.display()))?;
            parse_batch(BufReader::new(file))
                .with_context(|| format!("failed to parse command file {}", path.display()))
        }
        _ => parse_batch(io::stdin().lock()).context("failed to parse commands from stdin"),
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("batch.txt");
        std::fs::write(&path, "echo a\n# skip\n[\"echo\", \"b c\"]\n").unwrap();

        let batch = load_batch(Some(&path)).unwrap();
        assert_eq!(batch, vec![vec!["echo", "a"], vec!["echo", "b c"]]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_batch(Some(Path::new("/nonexistent/batch.txt"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/batch.txt"));
    }
}
