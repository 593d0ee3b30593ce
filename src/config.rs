//! Run configuration
//!
//! A [`RipConfig`] is built once per invocation and passed down by reference.

use crate::file_operations::PlacementPolicy;
use crate::scratch::ScratchDir;
use crate::trim::TrimSelection;
use std::path::PathBuf;

/// Default subtitle language
pub const DEFAULT_LANGUAGE: &str = "English";

/// Default video quality
pub const DEFAULT_QUALITY: &str = "1080p";

/// Default episode file name format
pub const DEFAULT_NAME_FORMAT: &str = "{show} - S{season:02}E{episode:02}";

/// Default language tag of the audio track
pub const DEFAULT_AUDIO_LANGUAGE: &str = "jpn";

/// Everything that stays fixed for the duration of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RipConfig {
    /// Requested subtitle language, matched against track titles
    pub language: String,
    /// Requested video quality
    pub quality: String,
    /// Studio intros to cut from every episode
    pub trim: TrimSelection,
    /// Root under which show directories are created
    pub output_root: PathBuf,
    /// Where episodes are assembled
    pub scratch_root: PathBuf,
    /// Episode file name format, see [`crate::file_operations::format_filename`]
    pub name_format: String,
    /// Language tag of the audio track in the final container
    pub audio_language: String,
    /// Retry policy of the final move
    pub placement: PlacementPolicy,
}

impl Default for RipConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            quality: DEFAULT_QUALITY.to_string(),
            trim: TrimSelection::none(),
            output_root: PathBuf::from("."),
            scratch_root: ScratchDir::default_root(),
            name_format: DEFAULT_NAME_FORMAT.to_string(),
            audio_language: DEFAULT_AUDIO_LANGUAGE.to_string(),
            placement: PlacementPolicy::default(),
        }
    }
}

/// Login credentials for providers without a cached session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
