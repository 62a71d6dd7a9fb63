//! Building learning sets from directories of labelled recordings.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::manager::SampleManager;
use super::{AnalysisError, Result, Sample};

/// Recording files in `dir`, sorted by name. Hidden entries are skipped.
pub fn learning_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| AnalysisError::input(dir, err))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

/// Segments every recording in `dir` through `manager` and collects the
/// non-null samples.
pub fn read_learning_dir(dir: &Path, manager: &mut SampleManager) -> Result<Vec<Sample>> {
    for file in learning_files(dir)? {
        manager.add_file(file);
    }
    let samples: Vec<Sample> = std::iter::from_fn(|| manager.get_sample()).collect();
    info!(dir = %dir.display(), samples = samples.len(), "learning set read");
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_entries_are_skipped_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["RUDZ_2.wav", ".hidden.wav", "BOGA_1.wav"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = learning_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["BOGA_1.wav", "RUDZ_2.wav"]);
    }

    #[test]
    fn missing_directory_is_an_input_error() {
        let err = learning_files(Path::new("/nonexistent/learning")).unwrap_err();
        assert!(matches!(err, AnalysisError::Input { .. }));
    }
}
