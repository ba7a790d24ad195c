//! Turning free-form model output into code, explanations and table rows.
//!
//! All functions here are pure and total: any input string, including an empty
//! one, produces a result.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::services::prompts::{FIXED_CODE_MARKER, MODIFIED_CODE_MARKER};

const FENCE: &str = "```";

/// Explanation used when the model returned code only.
pub const NO_EXPLANATION: &str = "No explanation provided.";

/// Explicit explanation/code separators, checked in this order.
const CODE_MARKERS: &[&str] = &[
    FIXED_CODE_MARKER,
    MODIFIED_CODE_MARKER,
    "Corrected Script:",
    "Modified Script:",
    "Fixed Code:",
];

/// Section headers dropped from the start of an explanation.
const EXPLANATION_HEADERS: &[&str] = &["Analysis:", "Explanation:", "### ANALYSIS ###"];

/// Line prefixes that mark the start of source code.
const CODE_LINE_PREFIXES: &[&str] = &[
    "def ",
    "class ",
    "import ",
    "from ",
    "#include",
    "function ",
    "const ",
    "let ",
    "var ",
    "fn ",
    "pub ",
    "use ",
    "package ",
    "public ",
    "int main",
    "#!",
    FENCE,
];

/// Where an array of objects may begin inside prose.
static ARRAY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*\{").expect("array start pattern is valid"));

/// Return the body of the first fenced block, or the text unchanged when it
/// has no fence.
///
/// The language tag on the opening fence line is discarded. An unterminated
/// fence runs to the end of the text.
pub fn extract_code(raw: &str) -> String {
    let Some(open) = raw.find(FENCE) else {
        return raw.to_string();
    };
    let after_open = &raw[open + FENCE.len()..];

    let body = match (after_open.find('\n'), after_open.find(FENCE)) {
        // Fence and closing fence on a single line: ```code```
        (Some(newline), Some(close)) if close < newline => &after_open[..close],
        (None, Some(close)) => &after_open[..close],
        (Some(newline), _) => {
            let rest = &after_open[newline + 1..];
            match rest.find(FENCE) {
                Some(close) => &rest[..close],
                None => rest,
            }
        }
        (None, None) => "",
    };

    body.trim_start_matches(['\r', '\n']).trim_end().to_string()
}

fn strip_explanation_header(text: &str) -> String {
    let mut text = text.trim();
    for header in EXPLANATION_HEADERS {
        if let Some(rest) = text.strip_prefix(header) {
            text = rest.trim_start();
        }
    }
    text.trim().to_string()
}

fn explanation_or_placeholder(text: &str) -> String {
    let explanation = strip_explanation_header(text);
    if explanation.is_empty() {
        NO_EXPLANATION.to_string()
    } else {
        explanation
    }
}

type SplitStrategy = fn(&str) -> Option<(String, String)>;

/// Split on the earliest explicit marker.
fn split_on_marker(text: &str) -> Option<(String, String)> {
    let (pos, marker) = CODE_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker).map(|pos| (pos, *marker)))
        .min_by_key(|(pos, _)| *pos)?;

    let code = extract_code(text[pos + marker.len()..].trim());
    if code.trim().is_empty() {
        return None;
    }
    Some((explanation_or_placeholder(&text[..pos]), code))
}

/// Split at the first line that looks like code.
fn split_on_code_line(text: &str) -> Option<(String, String)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if CODE_LINE_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            let code = extract_code(&text[offset..]);
            if code.trim().is_empty() {
                return None;
            }
            return Some((explanation_or_placeholder(&text[..offset]), code));
        }
        offset += line.len();
    }
    None
}

const SPLIT_STRATEGIES: &[SplitStrategy] = &[split_on_marker, split_on_code_line];

/// Separate the prose explanation from the code in a model reply.
///
/// Strategies run in order: explicit marker, first code-looking line, and
/// finally the whole text as code with a placeholder explanation.
pub fn extract_explanation_and_code(raw: &str) -> (String, String) {
    let text = raw.trim();
    if text.is_empty() {
        return (String::new(), String::new());
    }

    SPLIT_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(text))
        .unwrap_or_else(|| (NO_EXPLANATION.to_string(), extract_code(text)))
}

/// One transcribed row of an FA diagram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionRecord {
    pub sheet_name: String,
    pub message: String,
    pub start_ecu: String,
    pub end_ecu: String,
    pub sending_ecu: String,
    pub receiving_ecu: String,
    pub dashed_line: String,
}

/// Outcome of parsing a transcription reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptionParse {
    pub records: Vec<TranscriptionRecord>,
    /// Set when the reply could not be (fully) understood
    pub warning: Option<String>,
}

impl TranscriptionParse {
    fn unparsed(warning: &str) -> Self {
        warn!("Transcription output not parsed: {}", warning);
        Self {
            records: Vec::new(),
            warning: Some(warning.to_string()),
        }
    }
}

/// Canonical snake_case form of a column name: "Sheet Name" -> "sheet_name".
fn canonical_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn record_from_object(object: &Map<String, Value>) -> TranscriptionRecord {
    let mut record = TranscriptionRecord::default();
    for (key, value) in object {
        let slot = match canonical_key(key).as_str() {
            "sheet_name" | "sheet" => &mut record.sheet_name,
            "message" => &mut record.message,
            "start_ecu" => &mut record.start_ecu,
            "end_ecu" => &mut record.end_ecu,
            "sending_ecu" => &mut record.sending_ecu,
            "receiving_ecu" => &mut record.receiving_ecu,
            "dashed_line" => &mut record.dashed_line,
            _ => continue,
        };
        *slot = value_to_string(value);
    }
    record
}

/// Entries of the top-level JSON value: an array, an object wrapping one, or a
/// single object.
fn entries(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut object) => {
            for key in ["results", "data", "items", "rows"] {
                if let Some(Value::Array(_)) = object.get(key)
                    && let Some(Value::Array(items)) = object.remove(key)
                {
                    return Some(items);
                }
            }
            Some(vec![Value::Object(object)])
        }
        _ => None,
    }
}

/// First array of objects embedded in surrounding text. Each candidate start is
/// parsed up to the end of its own value, so text after it does not matter.
fn embedded_array(text: &str) -> Option<Value> {
    ARRAY_START.find_iter(text).find_map(|candidate| {
        serde_json::Deserializer::from_str(&text[candidate.start()..])
            .into_iter::<Value>()
            .next()
            .and_then(Result::ok)
    })
}

/// Parse a transcription reply into rows.
///
/// Tries strict JSON after removing a code fence, then the first array-shaped
/// substring. Unparseable output yields no rows and a warning, never an error.
pub fn parse_transcription_json(raw: &str) -> TranscriptionParse {
    if raw.trim().is_empty() {
        return TranscriptionParse::unparsed("The model returned an empty response");
    }

    let unfenced = extract_code(raw);
    let value = serde_json::from_str::<Value>(unfenced.trim())
        .ok()
        .or_else(|| embedded_array(raw));

    let Some(value) = value else {
        return TranscriptionParse::unparsed("The model response did not contain valid JSON");
    };
    let Some(items) = entries(value) else {
        return TranscriptionParse::unparsed("The model response was not a JSON array or object");
    };

    let total = items.len();
    let records: Vec<TranscriptionRecord> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match item.as_object() {
            Some(object) => Some(record_from_object(object)),
            None => {
                warn!("Skipping non-object transcription entry at index {}", index);
                None
            }
        })
        .collect();

    let warning = (records.len() < total).then(|| {
        format!(
            "{} of {} entries were not objects and were skipped",
            total - records.len(),
            total
        )
    });

    TranscriptionParse { records, warning }
}
