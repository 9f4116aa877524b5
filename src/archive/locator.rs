use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

/// Walk `root` and return the paths of files whose name is one of `targets`.
///
/// Every target must match exactly one file; a missing target or a duplicate
/// copy fails with [`PipelineError::MissingFiles`]. Paths are returned in
/// file-name walk order.
pub fn locate(root: &Path, targets: &[String], archive_name: &str) -> Result<Vec<PathBuf>> {
    let found: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| targets.iter().any(|target| target == name))
        })
        .map(|entry| entry.into_path())
        .collect();

    let each_once = targets.iter().all(|target| {
        found
            .iter()
            .filter(|path| path.file_name().and_then(|n| n.to_str()) == Some(target.as_str()))
            .count()
            == 1
    });

    if found.len() != targets.len() || !each_once {
        let err = PipelineError::MissingFiles {
            archive: archive_name.to_string(),
            expected: targets.to_vec(),
            found: found.iter().map(|p| p.display().to_string()).collect(),
        };
        warn!(error = %err, "Unexpected archive content");
        return Err(err);
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_targets_anywhere_in_tree() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a/b/SoilAttr_LUCAS_2009.shx");
        touch(dir.path(), "a/b/SoilAttr_LUCAS_2009.shp");
        touch(dir.path(), "other/Soil.shx");

        let found = locate(
            dir.path(),
            &targets(&["SoilAttr_LUCAS_2009.shx", "Soil.shx"]),
            "a.zip",
        )
        .unwrap();
        assert_eq!(
            found,
            vec![
                dir.path().join("a/b/SoilAttr_LUCAS_2009.shx"),
                dir.path().join("other/Soil.shx"),
            ]
        );
    }

    #[test]
    fn missing_target_fails() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.txt");

        let err = locate(dir.path(), &targets(&["SoilAttr_LUCAS_2009.shx"]), "a.zip").unwrap_err();
        assert!(matches!(err, PipelineError::MissingFiles { ref found, .. } if found.is_empty()));
        assert_eq!(err.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_target_fails() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "v1/SoilAttr_LUCAS_2009.shx");
        touch(dir.path(), "v2/SoilAttr_LUCAS_2009.shx");

        let err = locate(dir.path(), &targets(&["SoilAttr_LUCAS_2009.shx"]), "a.zip").unwrap_err();
        assert!(matches!(err, PipelineError::MissingFiles { ref found, .. } if found.len() == 2));
    }

    #[test]
    fn duplicate_cannot_stand_in_for_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "v1/A.shx");
        touch(dir.path(), "v2/A.shx");

        let err = locate(dir.path(), &targets(&["A.shx", "B.shx"]), "a.zip").unwrap_err();
        assert!(matches!(err, PipelineError::MissingFiles { .. }));
    }
}
