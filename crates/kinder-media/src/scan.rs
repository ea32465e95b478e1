//! Post-run presence check on the uploads tree.

use futures::future::join_all;
use kinder_core::{FileStorage, LocalFileStorage};
use std::fmt;

use crate::error::MediaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub dir: String,
    /// Keys the manifest expects.
    pub expected: usize,
    /// Expected keys that exist.
    pub present: usize,
    /// Matching files in the directory that the manifest does not list,
    /// such as assets of other games.
    pub other_files: usize,
}

impl ScanReport {
    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.present)
    }

    pub fn is_complete(&self) -> bool {
        self.present >= self.expected
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_complete() { "✅" } else { "⚠️ " };
        write!(
            f,
            "{} {}: {}/{} files present",
            mark, self.dir, self.present, self.expected
        )?;
        if self.other_files > 0 {
            write!(f, " ({} other files)", self.other_files)?;
        }
        Ok(())
    }
}

/// Checks that every key in `keys` exists. Other files with `extension`
/// under `dir_key` are tallied separately and never count as present.
pub async fn scan(
    storage: &LocalFileStorage,
    dir_key: &str,
    extension: &str,
    keys: &[String],
) -> Result<ScanReport, MediaError> {
    let present = join_all(keys.iter().map(|key| storage.exists(key)))
        .await
        .into_iter()
        .filter(|found| *found)
        .count();
    let in_dir = storage.count_files(dir_key, &[extension]).await?;
    Ok(ScanReport {
        dir: dir_key.to_string(),
        expected: keys.len(),
        present,
        other_files: in_dir.saturating_sub(present),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("games/audio/{}.mp3", n)).collect()
    }

    #[tokio::test]
    async fn test_scan_counts_expected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf(), "/uploads".into());
        storage.save("games/audio/a.mp3", b"1").await.unwrap();
        storage.save("games/audio/b.mp3", b"1").await.unwrap();
        storage.save("games/audio/c.wav", b"1").await.unwrap();

        let report = scan(&storage, "games/audio", "mp3", &keys(&["a", "b", "c"])).await.unwrap();
        assert_eq!(report.present, 2);
        assert_eq!(report.missing(), 1);
        assert_eq!(report.other_files, 0);
        assert!(!report.is_complete());
        assert!(report.to_string().contains("2/3"));
    }

    #[tokio::test]
    async fn test_files_of_other_games_do_not_fill_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf(), "/uploads".into());
        storage.save("games/audio/fruit-welcome.mp3", b"1").await.unwrap();
        storage.save("games/audio/color-welcome.mp3", b"1").await.unwrap();
        storage.save("games/audio/color-bye.mp3", b"1").await.unwrap();

        let report = scan(&storage, "games/audio", "mp3", &keys(&["fruit-welcome", "fruit-bye"]))
            .await
            .unwrap();
        assert_eq!(report.present, 1);
        assert_eq!(report.missing(), 1);
        assert_eq!(report.other_files, 2);
        assert!(!report.is_complete());
        assert!(report.to_string().ends_with("1/2 files present (2 other files)"));
    }

    #[tokio::test]
    async fn test_scan_of_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf(), "/uploads".into());
        let report = scan(&storage, "games/images", "png", &[]).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.other_files, 0);
    }
}
