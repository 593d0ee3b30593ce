//! File naming and final artifact placement
//!
//! Final artifacts live at `<output>/<Show>/<Season>/<Episode>.<ext>`.

use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Container extension of every final artifact
pub const CONTAINER_EXTENSION: &str = "mkv";

/// Errors that can occur during file operations
#[derive(Debug, Error)]
pub enum FileOperationError {
    #[error("Failed to move {source_path} to {destination} after {attempts} attempts: {last_error}")]
    PlacementExhausted {
        source_path: PathBuf,
        destination: PathBuf,
        attempts: u32,
        last_error: io::Error,
    },
}

/// How often and how patiently a final artifact move is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Total number of move attempts
    pub attempts: u32,
    /// Pause between two attempts
    pub delay: Duration,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

/// Sanitizes a string for use in filenames by replacing problematic characters
///
/// Replaces characters that are invalid or problematic in filenames across platforms:
/// - Path separators: / \
/// - Reserved characters: : * ? " < > |
/// - Control characters
/// - Trim leading/trailing whitespace and dots
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    // Trim whitespace and dots from start/end
    sanitized.trim_matches(|c: char| c.is_whitespace() || c == '.').to_string()
}

/// Formats an episode file name (without extension) from a format string
///
/// Supported placeholders:
/// - `{show}` - Show title
/// - `{season}` or `{season:NN}` - Season number with optional zero-padding
/// - `{episode}` or `{episode:NN}` - Episode number with optional zero-padding
/// - `{title}` - Episode title
///
/// The result is sanitized as a whole.
///
/// # Examples
///
/// ```ignore
/// let result = format_filename(
///     "{show} - S{season:02}E{episode:02}",
///     "Sword Art Online",
///     1,
///     2,
///     "Beater",
/// );
/// assert_eq!(result, "Sword Art Online - S01E02");
/// ```
pub fn format_filename(
    format: &str,
    show_title: &str,
    season: u32,
    episode: u32,
    title: &str,
) -> String {
    let mut result = format.to_string();

    result = result.replace("{show}", show_title);
    result = replace_with_padding(&result, "season", season);
    result = replace_with_padding(&result, "episode", episode);
    result = result.replace("{title}", title);

    sanitize_filename(&result)
}

/// Helper function to replace placeholders with optional zero-padding
///
/// Handles both `{name}` and `{name:NN}` where NN is the padding width
fn replace_with_padding(text: &str, name: &str, value: u32) -> String {
    let mut result = text.to_string();

    // First, handle padded versions like {season:02}
    let pattern_start = format!("{{{name}:");
    while let Some(start) = result.find(&pattern_start) {
        if let Some(end) = result[start..].find('}') {
            let full_pattern = result[start..start + end + 1].to_string();
            let padding_str = &full_pattern[pattern_start.len()..full_pattern.len() - 1];

            match padding_str.parse::<usize>() {
                Ok(width) => {
                    let formatted = format!("{:0width$}", value, width = width);
                    result = result.replace(&full_pattern, &formatted);
                }
                // Leave malformed placeholders alone
                Err(_) => break,
            }
        } else {
            break;
        }
    }

    // Then handle unpadded version like {season}
    let simple_pattern = format!("{{{name}}}");
    result = result.replace(&simple_pattern, &value.to_string());

    result
}

/// Directory of a show below the output root
pub fn show_directory(output_root: &Path, show_title: &str) -> PathBuf {
    output_root.join(sanitize_filename(show_title))
}

/// Final path of an episode inside its season directory
pub fn episode_destination(season_dir: &Path, file_name: &str) -> PathBuf {
    season_dir.join(format!("{}.{}", file_name, CONTAINER_EXTENSION))
}

/// Moves a file, copying across filesystems when a rename is not possible
fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(rename_error) => {
            // Cross-device moves cannot be renamed; anything else is reported as is
            if !source.exists() || destination.exists() {
                return Err(rename_error);
            }
            debug!(
                "rename {} -> {} failed ({}), copying instead",
                source.display(),
                destination.display(),
                rename_error
            );
            fs::copy(source, destination)?;
            fs::remove_file(source)
        }
    }
}

/// Moves a finished artifact into place, retrying on failure
///
/// Transient conditions like a file lock held by a virus scanner or media
/// indexer usually clear within a few seconds.
pub fn place_with_retry(
    source: &Path,
    destination: &Path,
    policy: PlacementPolicy,
) -> Result<(), FileOperationError> {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match move_file(source, destination) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    "moving {} to {} failed (attempt {}/{}): {}",
                    source.display(),
                    destination.display(),
                    attempt,
                    attempts,
                    e
                );
                last_error = Some(e);
                if attempt < attempts && !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
            }
        }
    }

    Err(FileOperationError::PlacementExhausted {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        attempts,
        last_error: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no attempt was made")),
    })
}
