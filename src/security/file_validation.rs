//! Upload checks and storage for ticket attachments.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::core::config::UploadConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadProblem {
    Empty,
    TooLarge,
    DisallowedType,
}

#[derive(Debug, Clone)]
pub struct FileValidationConfig {
    pub max_size: usize,
    pub max_size_mb: u64,
    pub allowed_extensions: Vec<String>,
}

impl From<&UploadConfig> for FileValidationConfig {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_size: config.max_bytes(),
            max_size_mb: config.max_file_size_mb,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }
}

impl Default for FileValidationConfig {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("Invalid filename regex"));

/// Longest sanitized name kept. Stored names add a 20 character timestamp and
/// the form field name, and must fit `attachments.filename` (200).
pub const MAX_FILENAME_LEN: usize = 150;

fn trim_edges(name: &str) -> &str {
    name.trim_matches(|c| c == '.' || c == '_')
}

/// Reduces an uploaded name to ASCII letters, digits, `_`, `.` and `-`, with
/// whitespace and path separators folded into `_` and no leading or trailing
/// dots/underscores. `"../../etc/passwd"` becomes `"etc_passwd"`. Names over
/// [`MAX_FILENAME_LEN`] lose the end of their stem; the extension is kept.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(&joined, "");
    let cleaned = trim_edges(&cleaned);
    if cleaned.len() <= MAX_FILENAME_LEN {
        return cleaned.to_string();
    }

    // Only ASCII is left, so byte offsets are char boundaries.
    match cleaned.rsplit_once('.') {
        Some((stem, ext)) if ext.len() + 2 <= MAX_FILENAME_LEN => {
            let stem = trim_edges(&stem[..stem.len().min(MAX_FILENAME_LEN - ext.len() - 1)]);
            if stem.is_empty() {
                ext.to_string()
            } else {
                format!("{stem}.{ext}")
            }
        }
        _ => trim_edges(&cleaned[..MAX_FILENAME_LEN]).to_string(),
    }
}

pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Checks one upload, returning its sanitized name.
pub fn validate_file_upload(
    config: &FileValidationConfig,
    original_name: &str,
    size: usize,
) -> Result<String, UploadProblem> {
    let filename = secure_filename(original_name);

    if size == 0 {
        return Err(UploadProblem::Empty);
    }
    if size > config.max_size {
        return Err(UploadProblem::TooLarge);
    }

    match extension_of(&filename) {
        Some(ext) if config.allowed_extensions.iter().any(|allowed| *allowed == ext) => {
            Ok(filename)
        }
        _ => Err(UploadProblem::DisallowedType),
    }
}

/// `<UTC %Y%m%d%H%M%S%f>_<field>_<name>`, or without the field part for
/// reply attachments.
pub fn stored_filename(now: DateTime<Utc>, field: Option<&str>, filename: &str) -> String {
    let timestamp = now.format("%Y%m%d%H%M%S%6f");
    match field {
        Some(field) => format!("{timestamp}_{field}_{filename}"),
        None => format!("{timestamp}_{filename}"),
    }
}

pub async fn save_upload(dir: &Path, stored_name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(stored_name);
    tokio::fs::write(&path, data).await?;
    info!("Saved file: {}", stored_name);
    Ok(path)
}

/// Best effort; used to undo saves when the database write fails.
pub async fn remove_uploads(dir: &Path, stored_names: &[String]) {
    for name in stored_names {
        if let Err(e) = tokio::fs::remove_file(dir.join(name)).await {
            warn!("Could not remove orphaned upload {}: {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_mluts.txt");
        assert_eq!(secure_filename("..."), "");
        assert_eq!(secure_filename("C:\\Users\\x\\form (1).pdf"), "C_Users_x_form_1.pdf");
    }

    #[test]
    fn test_validate_file_upload() {
        let config = FileValidationConfig::default();
        assert_eq!(
            validate_file_upload(&config, "Leave Form.PDF", 1024),
            Ok("Leave_Form.PDF".to_string())
        );
        assert_eq!(
            validate_file_upload(&config, "form.pdf", 0),
            Err(UploadProblem::Empty)
        );
        assert_eq!(
            validate_file_upload(&config, "form.pdf", config.max_size + 1),
            Err(UploadProblem::TooLarge)
        );
        assert_eq!(
            validate_file_upload(&config, "setup.exe", 10),
            Err(UploadProblem::DisallowedType)
        );
        assert_eq!(
            validate_file_upload(&config, "noextension", 10),
            Err(UploadProblem::DisallowedType)
        );
    }

    #[test]
    fn test_stored_filename() {
        let now = Utc
            .with_ymd_and_hms(2025, 3, 4, 5, 6, 7)
            .single()
            .expect("valid time");
        assert_eq!(
            stored_filename(now, Some("leave_form"), "form.pdf"),
            "20250304050607000000_leave_form_form.pdf"
        );
        assert_eq!(stored_filename(now, None, "a.png"), "20250304050607000000_a.png");
    }

    #[test]
    fn test_overlong_name_is_shortened_and_keeps_extension() {
        let now = Utc
            .with_ymd_and_hms(2025, 3, 4, 5, 6, 7)
            .single()
            .expect("valid time");
        let original = format!("{}.pdf", "a".repeat(246));
        assert_eq!(original.len(), 250);

        let name = validate_file_upload(&FileValidationConfig::default(), &original, 10)
            .expect("pdf accepted");
        assert_eq!(name.len(), MAX_FILENAME_LEN);
        assert!(name.ends_with(".pdf"));

        let stored = stored_filename(now, Some("locator_slip_file"), &name);
        assert!(stored.len() <= 200, "{} chars", stored.len());
        assert!(stored.ends_with(".pdf"));

        let cut_at_underscore = format!("{}_{}.pdf", "b".repeat(145), "b".repeat(10));
        assert_eq!(secure_filename(&cut_at_underscore), format!("{}.pdf", "b".repeat(145)));
        assert_eq!(secure_filename(&"c".repeat(300)).len(), MAX_FILENAME_LEN);
    }

    #[tokio::test]
    async fn test_save_and_remove_upload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploads = dir.path().join("uploads");
        let path = save_upload(&uploads, "x_a.pdf", b"%PDF-1.4")
            .await
            .expect("save");
        assert!(path.exists());
        remove_uploads(&uploads, &["x_a.pdf".to_string()]).await;
        assert!(!path.exists());
    }
}
