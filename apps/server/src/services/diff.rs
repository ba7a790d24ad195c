//! Line-oriented diff between two script bodies.

use serde::Serialize;
use similar::{Algorithm, ChangeTag, TextDiff};
use utoipa::ToSchema;

/// Kind of a diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiffTag {
    Unchanged,
    Added,
    Removed,
}

impl DiffTag {
    fn css_class(&self) -> &'static str {
        match self {
            Self::Unchanged => "diff-line-unchanged",
            Self::Added => "diff-line-added",
            Self::Removed => "diff-line-removed",
        }
    }

    fn sign(&self) -> char {
        match self {
            Self::Unchanged => ' ',
            Self::Added => '+',
            Self::Removed => '-',
        }
    }
}

/// One line of a diff with its 1-based positions in the old and new text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DiffLine {
    pub tag: DiffTag,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_lineno: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_lineno: Option<usize>,
}

/// Result of comparing two texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LineDiff {
    /// True when the texts have identical lines
    pub no_changes: bool,
    pub lines: Vec<DiffLine>,
}

/// Compute a Myers line diff.
pub fn diff(old_text: &str, new_text: &str) -> LineDiff {
    let old_lines: Vec<&str> = old_text.lines().collect();
    let new_lines: Vec<&str> = new_text.lines().collect();

    let text_diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&old_lines, &new_lines);

    let lines: Vec<DiffLine> = text_diff
        .iter_all_changes()
        .map(|change| DiffLine {
            tag: match change.tag() {
                ChangeTag::Equal => DiffTag::Unchanged,
                ChangeTag::Insert => DiffTag::Added,
                ChangeTag::Delete => DiffTag::Removed,
            },
            content: change.value().to_string(),
            old_lineno: change.old_index().map(|i| i + 1),
            new_lineno: change.new_index().map(|i| i + 1),
        })
        .collect();

    let no_changes = lines.iter().all(|line| line.tag == DiffTag::Unchanged);

    LineDiff { no_changes, lines }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl LineDiff {
    /// Render as HTML spans, one per line.
    pub fn render_html(&self) -> String {
        if self.no_changes {
            return r#"<div class="diff-no-changes">No changes</div>"#.to_string();
        }

        let mut html = String::from(r#"<div class="diff">"#);
        for line in &self.lines {
            html.push_str(&format!(
                "<span class=\"{}\">{}{}</span>\n",
                line.tag.css_class(),
                line.tag.sign(),
                escape_html(&line.content)
            ));
        }
        html.push_str("</div>");
        html
    }
}
