//! Subtitle acquisition engine
//!
//! Turns an encrypted provider payload into an `.ass` subtitle track:
//! key derivation, AES-256-CBC decryption, zlib inflation, XML parsing and
//! rendering with a time offset.
mod ass;
mod decrypt;
mod key;
mod script;
mod wire;

pub use ass::{PLAY_RES_X, PLAY_RES_Y, format_timestamp, parse_timestamp, render, shift_timestamp};
pub use decrypt::decrypt;
pub use key::{KEY_LEN, derive_key};
pub use script::{Event, Style, SubtitleDocument, parse};
pub use wire::{
    FALLBACK_LANGUAGE, Subtitle, SubtitleListing, UNDETERMINED_LANGUAGE, language_tag,
    parse_listing, parse_payload, resolve_track,
};

use thiserror::Error;

/// Errors that can occur while decoding a subtitle payload
#[derive(Debug, Error)]
pub enum SubtitleError {
    /// The iv or ciphertext is not valid base64
    #[error("Failed to decode subtitle {0}")]
    Decode(String),

    /// The block cipher rejected the key, iv or ciphertext
    #[error("Failed to decrypt subtitle: {0}")]
    Decrypt(String),

    /// The decrypted bytes are not a valid zlib stream
    #[error("Failed to inflate subtitle: {0}")]
    Inflate(String),

    /// The subtitle XML could not be parsed
    #[error("Failed to parse subtitle XML: {0}")]
    Parse(String),

    /// The script has no styles block
    #[error("Subtitle script has no styles block")]
    MissingStyles,

    /// The script has no events block
    #[error("Subtitle script has no events block")]
    MissingEvents,

    /// An event carries a timestamp that cannot be shifted
    #[error("Invalid subtitle timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Converts a decrypted subtitle script into ASS text
///
/// Every event timestamp is shifted forward by `offset_ms`.
pub fn transcode(script_xml: &str, offset_ms: u64) -> Result<String, SubtitleError> {
    let document = parse(script_xml)?;
    render(&document, offset_ms)
}

/// Decrypts a subtitle payload and converts it into ASS text
pub fn decode_to_ass(subtitle: &Subtitle, offset_ms: u64) -> Result<String, SubtitleError> {
    let script = decrypt(subtitle)?;
    transcode(&script, offset_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::decrypt::tests::sample_subtitle;

    #[test]
    fn test_decode_to_ass() {
        let ass = decode_to_ass(&sample_subtitle(), 0).unwrap();

        assert!(ass.starts_with("[Script Info]\nTitle: English (US)\n"));
        assert!(ass.contains("\nDialogue: 0,0:00:01.23,0:00:03.45,Main,,"));
    }

    #[test]
    fn test_offset_only_changes_event_lines() {
        let plain = decode_to_ass(&sample_subtitle(), 0).unwrap();
        let shifted = decode_to_ass(&sample_subtitle(), 1000).unwrap();

        let (plain_head, plain_events) = plain.split_once("[Events]").unwrap();
        let (shifted_head, shifted_events) = shifted.split_once("[Events]").unwrap();
        assert_eq!(plain_head, shifted_head);
        assert_ne!(plain_events, shifted_events);
        assert!(shifted_events.contains("Dialogue: 0,0:00:02.23,0:00:04.45,"));
    }

    #[test]
    fn test_transcode_requires_events() {
        let xml = r#"<subtitle_script><styles><style name="S"/></styles></subtitle_script>"#;
        assert!(matches!(
            transcode(xml, 0),
            Err(SubtitleError::MissingEvents)
        ));
    }
}
