use crate::error::{IngestError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lists every regular file under `root`, recursively and sorted, skipping filenames that start
/// with one of `blacklist_prefixes`.
pub fn discover_files(root: &Path, blacklist_prefixes: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(root, blacklist_prefixes, &mut files)?;
    files.sort();
    debug!(
        root = %root.display(),
        file_count = files.len(),
        "file discovery complete"
    );
    Ok(files)
}

pub fn is_blacklisted(path: &Path, blacklist_prefixes: &[String]) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| {
            blacklist_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
        })
}

fn collect_files(path: &Path, blacklist_prefixes: &[String], files: &mut Vec<PathBuf>) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|source| discovery_err(path, source))?;
    if metadata.is_file() {
        push_candidate(path, blacklist_prefixes, files);
    } else if metadata.is_dir() {
        collect_dir(path, blacklist_prefixes, files)?;
    }
    Ok(())
}

// Symlinked files are candidates; symlinked directories are never descended into.
fn collect_dir(dir: &Path, blacklist_prefixes: &[String], files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|source| discovery_err(dir, source))? {
        let entry = entry.map_err(|source| discovery_err(dir, source))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|source| discovery_err(&path, source))?;

        if file_type.is_dir() {
            collect_dir(&path, blacklist_prefixes, files)?;
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            push_candidate(&path, blacklist_prefixes, files);
        } else if file_type.is_symlink() {
            debug!(path = %path.display(), "not following symlink");
        }
    }
    Ok(())
}

fn push_candidate(path: &Path, blacklist_prefixes: &[String], files: &mut Vec<PathBuf>) {
    if is_blacklisted(path, blacklist_prefixes) {
        debug!(path = %path.display(), "skipping blacklisted file");
    } else {
        files.push(path.to_path_buf());
    }
}

fn discovery_err(path: &Path, source: std::io::Error) -> IngestError {
    IngestError::Discovery {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn blacklist() -> Vec<String> {
        vec!["deathlog".to_string()]
    }

    #[test]
    fn lists_files_recursively_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("zone_b")).unwrap();
        fs::write(dir.path().join("Orc_5.log"), "").unwrap();
        fs::write(dir.path().join("zone_b").join("Goblin_1023.log"), "").unwrap();
        fs::write(dir.path().join("Boss_Raid_77.log"), "").unwrap();

        let files = discover_files(dir.path(), &blacklist()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("Boss_Raid_77.log"),
                dir.path().join("Orc_5.log"),
                dir.path().join("zone_b").join("Goblin_1023.log"),
            ]
        );
    }

    #[test]
    fn skips_blacklisted_filenames_only() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deathlog_archive");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("deathlog_9.txt"), "Goblin dies\n").unwrap();
        fs::write(nested.join("Orc_5.log"), "").unwrap();

        let files = discover_files(dir.path(), &blacklist()).unwrap();
        assert_eq!(files, vec![nested.join("Orc_5.log")]);
    }

    #[test]
    fn prefix_match_is_on_filename_start() {
        let list = blacklist();
        assert!(is_blacklisted(Path::new("a/deathlog.txt"), &list));
        assert!(is_blacklisted(Path::new("deathlog_9.txt"), &list));
        assert!(!is_blacklisted(Path::new("my_deathlog_9.txt"), &list));
        assert!(!is_blacklisted(Path::new("Goblin_1.log"), &[]));
    }

    #[cfg(unix)]
    #[test]
    fn does_not_follow_symlinked_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Goblin_1023.log"), "Goblin dies\n").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let files = discover_files(dir.path(), &blacklist()).unwrap();
        assert_eq!(files, vec![dir.path().join("Goblin_1023.log")]);
    }

    #[cfg(unix)]
    #[test]
    fn includes_symlinked_files() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("Orc_5.log");
        fs::write(&target, "Orc spawns\n").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("Orc_5.log")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone.log"), dir.path().join("Dangling_1.log"))
            .unwrap();

        let files = discover_files(dir.path(), &blacklist()).unwrap();
        assert_eq!(files, vec![dir.path().join("Orc_5.log")]);
    }

    #[test]
    fn missing_root_is_a_discovery_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_files(&dir.path().join("absent"), &blacklist()).unwrap_err();
        assert!(matches!(err, IngestError::Discovery { .. }));
        assert!(!err.is_file_scoped());
    }
}
