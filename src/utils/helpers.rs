/// Helper utilities for backupbot

use chrono::Utc;
use std::path::{Component, Path};
use std::sync::atomic::{AtomicU64, Ordering};

static CONTAINER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh helper container name derived from the current time.
///
/// The counter keeps names distinct when two calls share a timestamp.
pub fn unique_container_name(prefix: &str) -> String {
    let seq = CONTAINER_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d%H%M%S%9f"), seq)
}

/// Join the last `steps` components of `path` with `_`.
///
/// `/srv/project/data` with 3 steps becomes `srv_project_data`.
pub fn path_to_name(path: &Path, steps: usize) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();

    let start = parts.len().saturating_sub(steps);
    parts[start..].join("_")
}

/// Everything after the first `.` of a file name (`a.tar.gz` -> `tar.gz`).
pub fn file_suffix(file_name: &str) -> &str {
    let trimmed = file_name.trim_start_matches('.');
    trimmed.split_once('.').map(|(_, suffix)| suffix).unwrap_or("")
}

/// Single-quote `value` for `sh -c`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

/// Format bytes to human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Format duration to human-readable string
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_unique_container_name() {
        let a = unique_container_name("backupbot");
        let b = unique_container_name("backupbot");
        assert_ne!(a, b);
        assert!(a.starts_with("backupbot-"));
    }

    #[test]
    fn test_path_to_name() {
        assert_eq!(path_to_name(&PathBuf::from("/srv/project/data"), 3), "srv_project_data");
        assert_eq!(path_to_name(&PathBuf::from("/a/b/c/d"), 2), "c_d");
        assert_eq!(path_to_name(&PathBuf::from("data"), 3), "data");
    }

    #[test]
    fn test_file_suffix() {
        assert_eq!(file_suffix("backup.tar.gz"), "tar.gz");
        assert_eq!(file_suffix("shop.sql"), "sql");
        assert_eq!(file_suffix(".hidden.txt"), "txt");
        assert_eq!(file_suffix("README"), "");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3720), "1h 2m");
    }
}
