//! Discovery of the text files a learner or vocabulary builder reads.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::{Result, RtokError};

/// Expands `inputs` into the list of files to read.
///
/// Files are taken as given. Directories are walked recursively unless
/// [`CorpusConfig::recursive`] is unset, in which case only their first level is listed.
/// Entries of a directory are returned in file name order.
pub fn collect_paths<P: AsRef<Path>>(inputs: &[P], cfg: &CorpusConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = input.as_ref();
        if !path.exists() {
            return Err(RtokError::io(
                std::io::Error::new(std::io::ErrorKind::NotFound, "input path does not exist"),
                Some(path.to_path_buf()),
            ));
        }
        if path.is_dir() {
            let depth = if cfg.recursive { usize::MAX } else { 1 };
            let walker = WalkDir::new(path)
                .follow_links(cfg.follow_symlinks)
                .max_depth(depth)
                .sort_by_file_name();
            for entry in walker {
                let entry = entry.map_err(|err| {
                    let path = err.path().map(Path::to_path_buf);
                    match err.into_io_error() {
                        Some(source) => RtokError::io(source, path),
                        None => RtokError::Internal("filesystem loop while walking inputs".into()),
                    }
                })?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.to_path_buf());
        }
    }
    if files.is_empty() {
        return Err(RtokError::InvalidConfig(
            "no files discovered in provided inputs".into(),
        ));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn collect_paths_discovers_files_recursively() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).expect("create nested directory");
        let file_a = dir.path().join("a.txt");
        let file_b = nested.join("b.txt");
        fs::write(&file_a, "one").expect("write a");
        fs::write(&file_b, "two").expect("write b");

        let paths = collect_paths(&[dir.path()], &CorpusConfig::default()).expect("collect");
        assert_eq!(paths, vec![file_a.clone(), file_b]);

        let shallow = CorpusConfig {
            recursive: false,
            ..CorpusConfig::default()
        };
        let paths = collect_paths(&[dir.path()], &shallow).expect("collect shallow");
        assert_eq!(paths, vec![file_a]);
    }

    #[test]
    fn missing_inputs_are_io_errors() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("missing.txt");
        let err = collect_paths(&[&missing], &CorpusConfig::default()).expect_err("missing");
        assert!(matches!(err, RtokError::Io { path: Some(p), .. } if p == missing));
    }

    #[test]
    fn empty_directories_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let err = collect_paths(&[dir.path()], &CorpusConfig::default()).expect_err("empty");
        assert!(matches!(err, RtokError::InvalidConfig(_)));
    }
}
