use std::path::{Component, Path, PathBuf};

use thiserror::Error;

pub const RUNS_DIR_NAME: &str = "Runs";

#[derive(Debug, Error)]
pub enum PathError {
    #[error("name is not a single path component: {0:?}")]
    UnsafeName(String),
    #[error("path has no owning {kind} directory: {}", .path.display())]
    MissingLineage { kind: &'static str, path: PathBuf },
}

/// Catalog names become directory names, so they must map to exactly one normal component.
pub fn is_safe_component(name: &str) -> bool {
    if name.trim().is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

pub fn checked_component(name: &str) -> Result<&str, PathError> {
    if is_safe_component(name) {
        Ok(name)
    } else {
        Err(PathError::UnsafeName(name.to_string()))
    }
}

pub fn contest_dir(mirror_root: &Path, contest_name: &str) -> PathBuf {
    mirror_root.join(contest_name)
}

pub fn problem_dir(mirror_root: &Path, contest_name: &str, problem_name: &str) -> PathBuf {
    contest_dir(mirror_root, contest_name).join(problem_name)
}

pub fn run_dir(problem_dir: &Path, run_number: u32) -> PathBuf {
    problem_dir.join(RUNS_DIR_NAME).join(run_number.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub contest: String,
    pub problem: String,
    pub problem_dir: PathBuf,
}

/// `<root>/<contest>/<problem>` -> names of the contest and problem.
pub fn problem_lineage(problem_dir: &Path) -> Result<Lineage, PathError> {
    let missing = |kind| PathError::MissingLineage {
        kind,
        path: problem_dir.to_path_buf(),
    };
    let problem = file_name(problem_dir).ok_or_else(|| missing("problem"))?;
    let contest = problem_dir
        .parent()
        .and_then(file_name)
        .ok_or_else(|| missing("contest"))?;
    Ok(Lineage {
        contest,
        problem,
        problem_dir: problem_dir.to_path_buf(),
    })
}

/// A file directly inside a problem directory.
pub fn file_lineage(file: &Path) -> Result<Lineage, PathError> {
    let parent = file.parent().ok_or_else(|| PathError::MissingLineage {
        kind: "problem",
        path: file.to_path_buf(),
    })?;
    problem_lineage(parent)
}

fn file_name(path: &Path) -> Option<String> {
    match path.components().next_back()? {
        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(is_safe_component("OBI"));
        assert!(is_safe_component("Maratona 2024"));
        assert!(is_safe_component("a.b"));
    }

    #[test]
    fn rejects_traversal_and_separators() {
        for name in ["", "  ", ".", "..", "a/b", "a\\b", "/abs"] {
            assert!(!is_safe_component(name), "{name:?} should be rejected");
        }
        assert!(matches!(
            checked_component(".."),
            Err(PathError::UnsafeName(_))
        ));
    }

    #[test]
    fn maps_catalog_names_under_mirror_root() {
        let root = PathBuf::from("/mirror");
        assert_eq!(
            problem_dir(&root, "OBI", "A"),
            PathBuf::from("/mirror/OBI/A")
        );
        assert_eq!(
            run_dir(&PathBuf::from("/mirror/OBI/A"), 5),
            PathBuf::from("/mirror/OBI/A/Runs/5")
        );
    }

    #[test]
    fn resolves_lineage_from_file_path() {
        let lineage = file_lineage(Path::new("/mirror/OBI/A/sol.c")).unwrap();
        assert_eq!(lineage.contest, "OBI");
        assert_eq!(lineage.problem, "A");
        assert_eq!(lineage.problem_dir, PathBuf::from("/mirror/OBI/A"));
    }

    #[test]
    fn lineage_requires_two_named_ancestors() {
        assert!(matches!(
            file_lineage(Path::new("/sol.c")),
            Err(PathError::MissingLineage { .. })
        ));
        assert!(matches!(
            problem_lineage(Path::new("A")),
            Err(PathError::MissingLineage { kind: "contest", .. })
        ));
    }
}
