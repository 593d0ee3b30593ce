//! Advanced SubStation Alpha rendering
//!
//! Renders a [`SubtitleDocument`] into `.ass` text. Event timestamps are
//! shifted by a fixed offset to compensate for trimmed intros; everything
//! else passes through unchanged.

use super::SubtitleError;
use super::script::SubtitleDocument;
use std::fmt::Write;

/// Canvas width written to every script header
pub const PLAY_RES_X: u32 = 656;

/// Canvas height written to every script header
pub const PLAY_RES_Y: u32 = 368;

const STYLE_FORMAT: &str = "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding";

const EVENT_FORMAT: &str =
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text";

/// Parses an `H:MM:SS.cc` timestamp into milliseconds
pub fn parse_timestamp(value: &str) -> Result<u64, SubtitleError> {
    let invalid = || SubtitleError::InvalidTimestamp(value.to_string());

    let mut parts = value.trim().split(':');
    let (Some(hours), Some(minutes), Some(seconds), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let hours: u64 = hours.parse().map_err(|_| invalid())?;
    let minutes: u64 = minutes.parse().map_err(|_| invalid())?;

    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, "0"));
    let whole: u64 = whole.parse().map_err(|_| invalid())?;
    if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    // Normalize the fraction to milliseconds, dropping digits beyond them
    let millis_text: String = fraction.chars().chain("000".chars()).take(3).collect();
    let millis: u64 = millis_text.parse().map_err(|_| invalid())?;

    Ok(((hours * 60 + minutes) * 60 + whole) * 1000 + millis)
}

/// Formats milliseconds as an `H:MM:SS.cc` timestamp, rounded to centiseconds
pub fn format_timestamp(millis: u64) -> String {
    let centis = (millis + 5) / 10;
    let hours = centis / 360_000;
    let minutes = centis / 6_000 % 60;
    let seconds = centis / 100 % 60;
    let centis = centis % 100;

    format!("{}:{:02}:{:02}.{:02}", hours, minutes, seconds, centis)
}

/// Shifts a timestamp forward by `offset_ms`
///
/// A zero offset returns the value untouched.
pub fn shift_timestamp(value: &str, offset_ms: u64) -> Result<String, SubtitleError> {
    if offset_ms == 0 {
        return Ok(value.to_string());
    }

    Ok(format_timestamp(parse_timestamp(value)? + offset_ms))
}

/// Renders a document as ASS text with every event shifted by `offset_ms`
pub fn render(document: &SubtitleDocument, offset_ms: u64) -> Result<String, SubtitleError> {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = write!(
        out,
        "[Script Info]\nTitle: {}\nScriptType: v4.00+\nWrapStyle: {}\nPlayResX: {}\nPlayResY: {}\n\n",
        document.title, document.wrap_style, PLAY_RES_X, PLAY_RES_Y
    );

    out.push_str("[V4+ Styles]\n");
    out.push_str(STYLE_FORMAT);
    out.push('\n');
    for style in &document.styles {
        let fields = [
            &style.name,
            &style.font_name,
            &style.font_size,
            &style.primary_colour,
            &style.secondary_colour,
            &style.outline_colour,
            &style.back_colour,
            &style.bold,
            &style.italic,
            &style.underline,
            &style.strikeout,
            &style.scale_x,
            &style.scale_y,
            &style.spacing,
            &style.angle,
            &style.border_style,
            &style.outline,
            &style.shadow,
            &style.alignment,
            &style.margin_l,
            &style.margin_r,
            &style.margin_v,
            &style.encoding,
        ];
        out.push_str("Style: ");
        out.push_str(&join_fields(&fields));
        out.push('\n');
    }

    out.push_str("\n[Events]\n");
    out.push_str(EVENT_FORMAT);
    out.push('\n');
    for event in &document.events {
        let start = shift_timestamp(&event.start, offset_ms)?;
        let end = shift_timestamp(&event.end, offset_ms)?;
        let fields = [
            &start,
            &end,
            &event.style,
            &event.name,
            &event.margin_l,
            &event.margin_r,
            &event.margin_v,
            &event.effect,
            &event.text,
        ];
        out.push_str("Dialogue: 0,");
        out.push_str(&join_fields(&fields));
        out.push('\n');
    }

    Ok(out)
}

fn join_fields(fields: &[&String]) -> String {
    fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::decrypt::tests::SAMPLE_SCRIPT;
    use crate::subtitle::script::parse;

    const SAMPLE_HEADER_AND_STYLES: &str = "[Script Info]\nTitle: English (US)\nScriptType: v4.00+\nWrapStyle: 0\nPlayResX: 656\nPlayResY: 368\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\nStyle: Main,Trebuchet MS,24,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,1,0,0,0,100,100,0,0,1,2,1,2,0020,0020,0022,0\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n";

    #[test]
    fn test_render_without_offset() {
        let document = parse(SAMPLE_SCRIPT).unwrap();
        let expected = format!(
            "{}{}",
            SAMPLE_HEADER_AND_STYLES,
            "Dialogue: 0,0:00:01.23,0:00:03.45,Main,,0000,0000,0000,,Hello there.\n\
             Dialogue: 0,0:00:04.00,0:00:06.10,Main,Narrator,0000,0000,0000,,{\\i1}Second line{\\i0}\\NWrapped.\n"
        );

        assert_eq!(render(&document, 0).unwrap(), expected);
    }

    #[test]
    fn test_render_with_offset_shifts_only_events() {
        let document = parse(SAMPLE_SCRIPT).unwrap();
        let expected = format!(
            "{}{}",
            SAMPLE_HEADER_AND_STYLES,
            "Dialogue: 0,0:00:06.27,0:00:08.49,Main,,0000,0000,0000,,Hello there.\n\
             Dialogue: 0,0:00:09.04,0:00:11.14,Main,Narrator,0000,0000,0000,,{\\i1}Second line{\\i0}\\NWrapped.\n"
        );

        assert_eq!(render(&document, 5040).unwrap(), expected);
    }

    #[test]
    fn test_render_is_deterministic() {
        let document = parse(SAMPLE_SCRIPT).unwrap();
        assert_eq!(
            render(&document, 6747).unwrap(),
            render(&document, 6747).unwrap()
        );
    }

    #[test]
    fn test_render_rejects_bad_timestamp_when_shifting() {
        let mut document = parse(SAMPLE_SCRIPT).unwrap();
        document.events[0].start = "soon".to_string();
        assert!(matches!(
            render(&document, 10),
            Err(SubtitleError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_timestamp_parsing() {
        assert_eq!(parse_timestamp("0:00:01.23").unwrap(), 1230);
        assert_eq!(parse_timestamp("1:02:03.4").unwrap(), 3_723_400);
        assert_eq!(parse_timestamp("0:00:05").unwrap(), 5000);
        assert!(parse_timestamp("00:01.23").is_err());
        assert!(parse_timestamp("0:00:01.").is_err());
    }

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(format_timestamp(1230), "0:00:01.23");
        assert_eq!(format_timestamp(3_723_400), "1:02:03.40");
        assert_eq!(format_timestamp(7977), "0:00:07.98");
        assert_eq!(format_timestamp(59_999), "0:01:00.00");
    }

    #[test]
    fn test_shift_crosses_minute_boundary() {
        assert_eq!(shift_timestamp("0:00:58.50", 8227).unwrap(), "0:01:06.73");
    }
}
