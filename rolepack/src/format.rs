//! Rendering retrieved exemplars as prompt context.

use crate::record::RetrievalResult;

/// Separator placed between a speaker label and its line by default.
pub const DEFAULT_SPEAKER_SEPARATOR: &str = ": ";

/// Renders a [`RetrievalResult`] as a dialogue block.
///
/// Each exemplar becomes two lines, the user's question then the role's
/// answer, followed by a blank line. Exemplars appear in result order, most
/// relevant first.
///
/// # Example
///
/// ```rust,ignore
/// use rolepack::ExemplarFormatter;
///
/// let text = ExemplarFormatter::new("张三", "爱莉").separator("说").format(&result);
/// // 张三说医生我最近头疼
/// // 爱莉说多喝热水哦
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExemplarFormatter {
    user_label: String,
    role_label: String,
    separator: String,
}

impl ExemplarFormatter {
    /// Create a formatter for the given speaker labels.
    pub fn new(user_label: impl Into<String>, role_label: impl Into<String>) -> Self {
        Self {
            user_label: user_label.into(),
            role_label: role_label.into(),
            separator: DEFAULT_SPEAKER_SEPARATOR.to_string(),
        }
    }

    /// Set the text inserted between each label and its line.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Render the result. An empty result renders as an empty string.
    pub fn format(&self, result: &RetrievalResult) -> String {
        let mut out = String::new();
        for exemplar in result {
            out.push_str(&self.user_label);
            out.push_str(&self.separator);
            out.push_str(&exemplar.record.question);
            out.push('\n');
            out.push_str(&self.role_label);
            out.push_str(&self.separator);
            out.push_str(&exemplar.record.answer);
            out.push_str("\n\n");
        }
        out
    }
}

/// Render `result` with the default separator.
pub fn format_exemplars(user_label: &str, role_label: &str, result: &RetrievalResult) -> String {
    ExemplarFormatter::new(user_label, role_label).format(result)
}
