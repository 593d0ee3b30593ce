//! Parsed subtitle scripts
//!
//! A decrypted payload is an XML `<subtitle_script>` document with a
//! `<styles>` block and an `<events>` block. Field values are kept as the
//! provider wrote them so the rendered output passes them through verbatim.

use super::SubtitleError;
use super::wire::attributes;
use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader;
use std::collections::HashMap;

/// A style definition (one `<style>` element)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    pub name: String,
    pub font_name: String,
    pub font_size: String,
    pub primary_colour: String,
    pub secondary_colour: String,
    pub outline_colour: String,
    pub back_colour: String,
    pub bold: String,
    pub italic: String,
    pub underline: String,
    pub strikeout: String,
    pub scale_x: String,
    pub scale_y: String,
    pub spacing: String,
    pub angle: String,
    pub border_style: String,
    pub outline: String,
    pub shadow: String,
    pub alignment: String,
    pub margin_l: String,
    pub margin_r: String,
    pub margin_v: String,
    pub encoding: String,
}

/// A timed dialogue line (one `<event>` element)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub start: String,
    pub end: String,
    pub style: String,
    pub name: String,
    pub margin_l: String,
    pub margin_r: String,
    pub margin_v: String,
    pub effect: String,
    pub text: String,
}

/// A complete subtitle script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleDocument {
    pub title: String,
    pub play_res_x: String,
    pub play_res_y: String,
    pub wrap_style: String,
    /// Styles in document order
    pub styles: Vec<Style>,
    /// Events in document order
    pub events: Vec<Event>,
}

/// Which block of the document the reader is inside
#[derive(Debug, Clone, Copy, PartialEq)]
enum Block {
    None,
    Styles,
    Events,
}

/// Reads a textual attribute, empty when absent
fn text(attrs: &HashMap<String, String>, name: &str) -> String {
    attrs.get(name).cloned().unwrap_or_default()
}

/// Reads a numeric attribute, `0` when absent
fn number(attrs: &HashMap<String, String>, name: &str) -> String {
    attrs
        .get(name)
        .cloned()
        .unwrap_or_else(|| "0".to_string())
}

impl Style {
    fn from_attributes(attrs: &HashMap<String, String>) -> Self {
        Self {
            name: text(attrs, "name"),
            font_name: text(attrs, "font_name"),
            font_size: number(attrs, "font_size"),
            primary_colour: text(attrs, "primary_colour"),
            secondary_colour: text(attrs, "secondary_colour"),
            outline_colour: text(attrs, "outline_colour"),
            back_colour: text(attrs, "back_colour"),
            bold: number(attrs, "bold"),
            italic: number(attrs, "italic"),
            underline: number(attrs, "underline"),
            strikeout: number(attrs, "strikeout"),
            scale_x: number(attrs, "scale_x"),
            scale_y: number(attrs, "scale_y"),
            spacing: number(attrs, "spacing"),
            angle: number(attrs, "angle"),
            border_style: number(attrs, "border_style"),
            outline: number(attrs, "outline"),
            shadow: number(attrs, "shadow"),
            alignment: number(attrs, "alignment"),
            margin_l: text(attrs, "margin_l"),
            margin_r: text(attrs, "margin_r"),
            margin_v: text(attrs, "margin_v"),
            encoding: number(attrs, "encoding"),
        }
    }
}

impl Event {
    fn from_attributes(attrs: &HashMap<String, String>) -> Self {
        Self {
            start: text(attrs, "start"),
            end: text(attrs, "end"),
            style: text(attrs, "style"),
            name: text(attrs, "name"),
            margin_l: text(attrs, "margin_l"),
            margin_r: text(attrs, "margin_r"),
            margin_v: text(attrs, "margin_v"),
            effect: text(attrs, "effect"),
            text: text(attrs, "text"),
        }
    }
}

/// Parses a decrypted subtitle script
///
/// Only the first `<styles>` and the first `<events>` block are used. A
/// document lacking either block is rejected.
pub fn parse(xml: &str) -> Result<SubtitleDocument, SubtitleError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut document = SubtitleDocument::default();
    let mut block = Block::None;
    let mut seen_root = false;
    let mut seen_styles = false;
    let mut seen_events = false;
    // Set once the first block of a kind has been closed
    let mut styles_done = false;
    let mut events_done = false;

    loop {
        let (element, is_empty) = match reader.read_event() {
            Ok(XmlEvent::Start(e)) => (e, false),
            Ok(XmlEvent::Empty(e)) => (e, true),
            Ok(XmlEvent::End(e)) => {
                match e.name().as_ref() {
                    b"styles" if block == Block::Styles => {
                        styles_done = true;
                        block = Block::None;
                    }
                    b"events" if block == Block::Events => {
                        events_done = true;
                        block = Block::None;
                    }
                    _ => {}
                }
                continue;
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(SubtitleError::Parse(format!("XML parse error: {}", e))),
            _ => continue,
        };

        match element.name().as_ref() {
            b"subtitle_script" if !seen_root => {
                seen_root = true;
                let attrs = attributes(&element)?;
                document.title = text(&attrs, "title");
                document.play_res_x = number(&attrs, "play_res_x");
                document.play_res_y = number(&attrs, "play_res_y");
                document.wrap_style = number(&attrs, "wrap_style");
            }
            b"styles" => {
                seen_styles = true;
                if !styles_done && !is_empty {
                    block = Block::Styles;
                } else if is_empty {
                    styles_done = true;
                }
            }
            b"events" => {
                seen_events = true;
                if !events_done && !is_empty {
                    block = Block::Events;
                } else if is_empty {
                    events_done = true;
                }
            }
            b"style" if block == Block::Styles => {
                document
                    .styles
                    .push(Style::from_attributes(&attributes(&element)?));
            }
            b"event" if block == Block::Events => {
                document
                    .events
                    .push(Event::from_attributes(&attributes(&element)?));
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(SubtitleError::Parse(
            "document has no subtitle_script element".to_string(),
        ));
    }
    if !seen_styles {
        return Err(SubtitleError::MissingStyles);
    }
    if !seen_events {
        return Err(SubtitleError::MissingEvents);
    }

    Ok(document)
}
