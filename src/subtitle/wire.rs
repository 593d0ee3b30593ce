//! Provider wire format for subtitle tracks
//!
//! Providers describe the subtitle tracks of an episode with an XML listing
//! (one `<subtitle>` element per track) and deliver each track's encrypted
//! payload as an XML document carrying the same attributes plus `<iv>` and
//! `<data>` children.

use super::SubtitleError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;

/// Language used when neither the requested language nor any other match is found
pub const FALLBACK_LANGUAGE: &str = "English";

/// Language tag used when a track title names no recognizable language
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// A single subtitle track as described by a provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subtitle {
    /// Provider-internal script identifier, also the key derivation input
    pub id: i64,
    /// Link to the track's payload
    pub link: String,
    /// Display title, e.g. `[English (US)] English (US)`
    pub title: String,
    /// Whether the provider marks this track as the default one
    pub default: bool,
    /// Provider-reported delay value
    pub delay: f64,
    /// Base64 encoded initialization vector (empty in listings)
    pub iv: String,
    /// Base64 encoded ciphertext (empty in listings)
    pub data: String,
}

/// The subtitle tracks a provider reports for an episode
#[derive(Debug, Clone, PartialEq)]
pub enum SubtitleListing {
    /// Captions are burned into the video; there is nothing to download
    Embedded,
    /// Downloadable tracks, in provider order
    Tracks(Vec<Subtitle>),
}

/// Collects the attributes of an element into a name → unescaped value map
pub(super) fn attributes(element: &BytesStart) -> Result<HashMap<String, String>, SubtitleError> {
    let mut map = HashMap::new();

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| SubtitleError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
        let value = attribute
            .unescape_value()
            .map_err(|e| SubtitleError::Parse(e.to_string()))?
            .to_string();
        map.insert(key, value);
    }

    Ok(map)
}

/// Builds a track from the attributes of a `<subtitle>` element
fn subtitle_from_attributes(attrs: &HashMap<String, String>) -> Result<Subtitle, SubtitleError> {
    let text = |name: &str| attrs.get(name).cloned().unwrap_or_default();

    let id = match attrs.get("id") {
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_err(|_| SubtitleError::Parse(format!("invalid subtitle id '{}'", value)))?,
        None => 0,
    };

    let delay = match attrs.get("delay") {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<f64>()
            .map_err(|_| SubtitleError::Parse(format!("invalid subtitle delay '{}'", value)))?,
        _ => 0.0,
    };

    Ok(Subtitle {
        id,
        link: text("link"),
        title: text("title"),
        default: attrs.get("default").map(|v| v.trim() == "1").unwrap_or(false),
        delay,
        iv: String::new(),
        data: String::new(),
    })
}

/// Parses a subtitle listing
///
/// A listing whose `<media_id>` is `None` reports embedded captions.
pub fn parse_listing(xml: &str) -> Result<SubtitleListing, SubtitleError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tracks = Vec::new();
    let mut current_element = String::new();
    let mut embedded = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "subtitle" {
                    tracks.push(subtitle_from_attributes(&attributes(&e)?)?);
                }
                current_element = name;
            }
            Ok(Event::Text(e)) => {
                if current_element == "media_id" {
                    let text = e
                        .unescape()
                        .map_err(|e| SubtitleError::Parse(e.to_string()))?;
                    if text.trim() == "None" {
                        embedded = true;
                    }
                }
            }
            Ok(Event::End(_)) => current_element.clear(),
            Ok(Event::Eof) => break,
            Err(e) => return Err(SubtitleError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
    }

    if embedded {
        return Ok(SubtitleListing::Embedded);
    }

    Ok(SubtitleListing::Tracks(tracks))
}

/// Parses the payload document of a single track
pub fn parse_payload(xml: &str) -> Result<Subtitle, SubtitleError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut subtitle: Option<Subtitle> = None;
    let mut iv = String::new();
    let mut data = String::new();
    let mut current_element = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                // The root element carries the track attributes
                if subtitle.is_none() {
                    subtitle = Some(subtitle_from_attributes(&attributes(&e)?)?);
                }
                current_element = name;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| SubtitleError::Parse(e.to_string()))?;
                match current_element.as_str() {
                    "iv" => iv.push_str(text.trim()),
                    "data" => data.push_str(text.trim()),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current_element.clear(),
            Ok(Event::Eof) => break,
            Err(e) => return Err(SubtitleError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
    }

    let mut subtitle =
        subtitle.ok_or_else(|| SubtitleError::Parse("empty subtitle document".to_string()))?;

    if iv.is_empty() || data.is_empty() {
        return Err(SubtitleError::Parse(
            "subtitle document carries no iv or data".to_string(),
        ));
    }

    subtitle.iv = iv;
    subtitle.data = data;
    Ok(subtitle)
}

/// Picks the track to download for the requested language
///
/// The first track whose title contains `language` wins. Otherwise the first
/// track whose title contains "English" is used. `None` means no subtitle is
/// available, which is not an error.
pub fn resolve_track<'a>(tracks: &'a [Subtitle], language: &str) -> Option<&'a Subtitle> {
    tracks
        .iter()
        .find(|track| track.title.contains(language))
        .or_else(|| {
            tracks
                .iter()
                .find(|track| track.title.contains(FALLBACK_LANGUAGE))
        })
}

/// Derives the ISO 639-3 tag for a track title
///
/// Scans the title word by word for a language name, either in English
/// ("French") or in the language itself ("Français").
pub fn language_tag(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .find_map(language_from_word)
        .map(|language| language.to_639_3().to_string())
        .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string())
}

fn language_from_word(word: &str) -> Option<isolang::Language> {
    use isolang::Language;

    // Autonyms are mostly stored lowercase ("español"), titles capitalize them
    Language::from_name(word)
        .or_else(|| Language::from_autonym(word))
        .or_else(|| Language::from_autonym(&word.to_lowercase()))
}
