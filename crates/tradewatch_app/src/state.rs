use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tradewatch_core::{Direction, HighWaterMark};
use tradewatch_logging::{watch_error, watch_info, watch_warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedMarks {
    sales: Option<i64>,
    purchases: Option<i64>,
}

impl PersistedMarks {
    fn slot(&mut self, direction: Direction) -> &mut Option<i64> {
        match direction {
            Direction::Sale => &mut self.sales,
            Direction::Purchase => &mut self.purchases,
        }
    }
}

fn read_marks(path: &Path) -> PersistedMarks {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return PersistedMarks::default();
        }
        Err(err) => {
            watch_warn!("Failed to read saved marks from {:?}: {}", path, err);
            return PersistedMarks::default();
        }
    };

    match ron::from_str(&content) {
        Ok(marks) => marks,
        Err(err) => {
            watch_warn!("Failed to parse saved marks from {:?}: {}", path, err);
            PersistedMarks::default()
        }
    }
}

/// Mark saved by an earlier run, or the sentinel when there is none.
pub(crate) fn load_mark(path: &Path, direction: Direction) -> HighWaterMark {
    let saved = *read_marks(path).slot(direction);
    let mark = saved
        .map(HighWaterMark::new)
        .unwrap_or(HighWaterMark::UNINITIALIZED);
    if mark.is_initialized() {
        watch_info!("Resuming {} from mark {}", direction.as_query(), mark);
    }
    mark
}

/// Records `mark` for `direction`, keeping the other direction's entry.
/// The sentinel is never written.
pub(crate) fn save_mark(path: &Path, direction: Direction, mark: HighWaterMark) {
    if !mark.is_initialized() {
        return;
    }
    let mut marks = read_marks(path);
    *marks.slot(direction) = Some(mark.get());

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&marks, pretty) {
        Ok(text) => text,
        Err(err) => {
            watch_error!("Failed to serialize marks: {}", err);
            return;
        }
    };

    if let Err(err) = write_atomically(path, &content) {
        watch_error!("Failed to write marks to {:?}: {}", path, err);
    }
}

/// Writes a temp file next to `path` and persists it over the target.
fn write_atomically(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_starts_uninitialized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marks.ron");
        assert_eq!(load_mark(&path, Direction::Sale), HighWaterMark::UNINITIALIZED);
    }

    #[test]
    fn directions_are_kept_apart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marks.ron");

        save_mark(&path, Direction::Sale, HighWaterMark::new(50));
        save_mark(&path, Direction::Purchase, HighWaterMark::new(7));
        save_mark(&path, Direction::Sale, HighWaterMark::new(52));

        assert_eq!(load_mark(&path, Direction::Sale), HighWaterMark::new(52));
        assert_eq!(load_mark(&path, Direction::Purchase), HighWaterMark::new(7));
    }

    #[test]
    fn save_leaves_only_the_target_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marks.ron");
        save_mark(&path, Direction::Sale, HighWaterMark::new(3));
        save_mark(&path, Direction::Sale, HighWaterMark::new(4));

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("marks.ron")]);
        assert!(fs::read_to_string(&path).unwrap().contains("sales: Some(4)"));
    }

    #[test]
    fn unwritable_target_keeps_no_staging_file() {
        let dir = TempDir::new().unwrap();
        // A directory in the way makes the final rename fail.
        let path = dir.path().join("marks.ron");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        save_mark(&path, Direction::Sale, HighWaterMark::new(9));
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("marks.ron")]);
    }

    #[test]
    fn sentinel_is_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marks.ron");
        save_mark(&path, Direction::Sale, HighWaterMark::UNINITIALIZED);
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marks.ron");
        fs::write(&path, "not ron at all").unwrap();
        assert_eq!(load_mark(&path, Direction::Sale), HighWaterMark::UNINITIALIZED);
    }
}
