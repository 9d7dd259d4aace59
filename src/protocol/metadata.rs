//! Metadata payload tokens
//!
//! Metadata frames carry short UTF-8, XML-shaped fragments such as
//! `<OMTSubscribe Video="true" />` or `<OMTTally Preview="false"
//! Program="true" />`. Interop peers are loose about casing and trailing
//! NUL padding, so recognition is case-insensitive substring matching,
//! not XML parsing.

/// On-air indicator state carried by `OMTTally` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TallyState {
    pub preview: bool,
    pub program: bool,
}

/// A recognized metadata message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataMessage {
    Subscribe {
        video: bool,
        audio: bool,
        metadata: bool,
    },
    Tally(TallyState),
    Settings {
        quality: String,
    },
    Info,
    Unrecognized,
}

/// Strip trailing NUL padding and decode as UTF-8 (lossy).
pub fn payload_text(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |p| p + 1);
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

/// Pull the value of `name="…"` out of a fragment, case-insensitively.
fn attribute_value<'a>(text: &'a str, lower: &str, name: &str) -> Option<&'a str> {
    let marker = format!("{}=\"", name.to_ascii_lowercase());
    let start = lower.find(&marker)? + marker.len();
    let len = lower[start..].find('"')?;
    Some(&text[start..start + len])
}

fn attribute_is_true(text: &str, lower: &str, name: &str) -> bool {
    attribute_value(text, lower, name)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Classify a metadata payload.
pub fn parse(payload: &[u8]) -> MetadataMessage {
    let text = payload_text(payload);
    let lower = text.to_ascii_lowercase();

    if lower.contains("omtsubscribe") || (lower.contains("subscribe") && lower.contains("omt")) {
        MetadataMessage::Subscribe {
            video: attribute_is_true(&text, &lower, "Video"),
            audio: attribute_is_true(&text, &lower, "Audio"),
            metadata: attribute_is_true(&text, &lower, "Metadata"),
        }
    } else if lower.contains("omttally") {
        MetadataMessage::Tally(TallyState {
            preview: attribute_is_true(&text, &lower, "Preview"),
            program: attribute_is_true(&text, &lower, "Program"),
        })
    } else if lower.contains("omtsettings") {
        MetadataMessage::Settings {
            quality: attribute_value(&text, &lower, "Quality")
                .unwrap_or("Default")
                .to_string(),
        }
    } else if lower.contains("omtinfo") {
        MetadataMessage::Info
    } else {
        MetadataMessage::Unrecognized
    }
}

/// Fast checks used by the sender's per-session reader, which only needs
/// the subscribe bits.
pub fn is_subscribe(text: &str) -> bool {
    contains_ignore_case(text, "Subscribe")
}

pub fn mentions_video(text: &str) -> bool {
    contains_ignore_case(text, "Video")
}

pub fn mentions_audio(text: &str) -> bool {
    contains_ignore_case(text, "Audio")
}

pub fn is_tally(text: &str) -> bool {
    contains_ignore_case(text, "Tally")
}

pub fn subscribe_video() -> String {
    "<OMTSubscribe Video=\"true\" />".to_string()
}

pub fn subscribe_audio() -> String {
    "<OMTSubscribe Audio=\"true\" />".to_string()
}

pub fn subscribe_metadata() -> String {
    "<OMTSubscribe Metadata=\"true\" />".to_string()
}

pub fn settings(quality: &str) -> String {
    format!("<OMTSettings Quality=\"{quality}\" />")
}

pub fn tally(state: TallyState) -> String {
    format!(
        "<OMTTally Preview=\"{}\" Program=\"{}\" />",
        state.preview, state.program
    )
}

pub fn info(product: &str, version: &str) -> String {
    format!("<OMTInfo ProductName=\"{product}\" Version=\"{version}\" />")
}
