//! Two-tier change detection.
//!
//! Tier 1 compares on-disk mtimes against the mtimes stored with the
//! vector records; a match within one second skips the file entirely.
//! Tier 2 (hash comparison for files whose mtime moved) is applied by the
//! indexing orchestrator after it has read the candidate, since the read
//! is only needed for files that fail tier 1.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::vector_index::PathMeta;

/// Filesystems with coarse mtime resolution round by up to a second.
pub const MTIME_TOLERANCE_SECS: f64 = 1.0;

/// A file found on disk, with the mtime observed by the same `stat` call
/// used for the comparison.
#[derive(Debug, Clone)]
pub struct DiskFile {
    pub path: PathBuf,
    pub mtime: f64,
}

/// The reconciliation plan for one vault.
#[derive(Debug, Default)]
pub struct ChangePlan {
    /// Indexed paths that no longer exist on disk.
    pub deletes: Vec<String>,
    /// Files that are new or whose mtime moved; tier 2 decides whether
    /// their content actually changed.
    pub candidates: Vec<DiskFile>,
    /// Files skipped by the mtime check.
    pub skipped_mtime: u64,
}

/// Diff the disk listing against the current index state.
pub fn plan_changes(disk: &[DiskFile], index: &HashMap<String, PathMeta>) -> ChangePlan {
    let mut plan = ChangePlan::default();

    let disk_paths: std::collections::HashSet<&str> = disk
        .iter()
        .map(|f| f.path.to_str().unwrap_or_default())
        .collect();

    for path in index.keys() {
        if !disk_paths.contains(path.as_str()) {
            plan.deletes.push(path.clone());
        }
    }
    plan.deletes.sort();

    for file in disk {
        let key = file.path.to_string_lossy();
        match index.get(key.as_ref()) {
            Some(meta) if (file.mtime - meta.mtime).abs() < MTIME_TOLERANCE_SECS => {
                plan.skipped_mtime += 1;
            }
            _ => plan.candidates.push(file.clone()),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(path: &str, mtime: f64) -> DiskFile {
        DiskFile {
            path: PathBuf::from(path),
            mtime,
        }
    }

    fn indexed(entries: &[(&str, &str, f64)]) -> HashMap<String, PathMeta> {
        entries
            .iter()
            .map(|(path, hash, mtime)| {
                (
                    path.to_string(),
                    PathMeta {
                        file_hash: hash.to_string(),
                        mtime: *mtime,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn unchanged_mtime_skips() {
        let plan = plan_changes(&[disk("/v/a.md", 100.0)], &indexed(&[("/v/a.md", "h", 100.0)]));
        assert_eq!(plan.skipped_mtime, 1);
        assert!(plan.candidates.is_empty());
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn sub_second_drift_tolerated() {
        let plan = plan_changes(&[disk("/v/a.md", 100.6)], &indexed(&[("/v/a.md", "h", 100.0)]));
        assert_eq!(plan.skipped_mtime, 1);

        let plan = plan_changes(&[disk("/v/a.md", 101.5)], &indexed(&[("/v/a.md", "h", 100.0)]));
        assert_eq!(plan.candidates.len(), 1);
    }

    #[test]
    fn new_files_are_candidates() {
        let plan = plan_changes(&[disk("/v/new.md", 5.0)], &HashMap::new());
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.skipped_mtime, 0);
    }

    #[test]
    fn missing_files_are_deletes() {
        let plan = plan_changes(
            &[disk("/v/kept.md", 1.0)],
            &indexed(&[("/v/kept.md", "h", 1.0), ("/v/gone.md", "h", 1.0)]),
        );
        assert_eq!(plan.deletes, vec!["/v/gone.md".to_string()]);
        assert_eq!(plan.skipped_mtime, 1);
    }

    #[test]
    fn mixed_plan() {
        let plan = plan_changes(
            &[
                disk("/v/same.md", 10.0),
                disk("/v/touched.md", 99.0),
                disk("/v/new.md", 1.0),
            ],
            &indexed(&[
                ("/v/same.md", "h1", 10.2),
                ("/v/touched.md", "h2", 50.0),
                ("/v/gone.md", "h3", 7.0),
            ]),
        );
        assert_eq!(plan.skipped_mtime, 1);
        assert_eq!(plan.candidates.len(), 2);
        assert_eq!(plan.deletes, vec!["/v/gone.md".to_string()]);
    }
}
