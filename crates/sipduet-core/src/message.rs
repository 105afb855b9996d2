//! Chat message rendering
//!
//! Messages are shown as a paragraph with two spans:
//!
//! ```text
//! <p class="message">
//!   <span class="message-from">Alice:</span><span class="message-body"> hi</span>
//! </p>
//! ```

use serde::{Deserialize, Serialize};

pub const MESSAGE_CLASS: &str = "message";
pub const FROM_CLASS: &str = "message-from";
pub const BODY_CLASS: &str = "message-body";

/// Inline text with a CSS class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub class: String,
    pub text: String,
}

impl Span {
    pub fn new(class: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            text: text.into(),
        }
    }

    pub fn to_html(&self) -> String {
        format!(
            "<span class=\"{}\">{}</span>",
            escape_html(&self.class),
            escape_html(&self.text)
        )
    }
}

/// A rendered message, not yet attached to any document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFragment {
    pub class: String,
    pub from: Span,
    pub body: Span,
}

impl MessageFragment {
    /// Text content as a reader would see it
    pub fn text(&self) -> String {
        format!("{}{}", self.from.text, self.body.text)
    }

    pub fn to_html(&self) -> String {
        format!(
            "<p class=\"{}\">{}{}</p>",
            escape_html(&self.class),
            self.from.to_html(),
            self.body.to_html()
        )
    }
}

impl std::fmt::Display for MessageFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Build the fragment for one message. Pure; the caller attaches it.
pub fn render_message(from: &str, body: &str) -> MessageFragment {
    MessageFragment {
        class: MESSAGE_CLASS.to_string(),
        from: Span::new(FROM_CLASS, format!("{}:", from)),
        body: Span::new(BODY_CLASS, format!(" {}", body)),
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_message_structure() {
        let fragment = render_message("Alice", "hello");

        assert_eq!(fragment.class, "message");
        assert_eq!(fragment.from, Span::new("message-from", "Alice:"));
        assert_eq!(fragment.body, Span::new("message-body", " hello"));
        assert_eq!(fragment.text(), "Alice: hello");
    }

    #[test]
    fn test_render_empty_body() {
        let fragment = render_message("Bob", "");
        assert_eq!(fragment.body.text, " ");
        assert_eq!(fragment.to_string(), "Bob: ");
    }

    #[test]
    fn test_to_html() {
        let html = render_message("Alice", "hello").to_html();
        assert_eq!(
            html,
            "<p class=\"message\"><span class=\"message-from\">Alice:</span>\
             <span class=\"message-body\"> hello</span></p>"
        );
    }

    #[test]
    fn test_to_html_escapes_text() {
        let html = render_message("<b>Eve</b>", "a & \"b\"").to_html();
        assert!(html.contains("&lt;b&gt;Eve&lt;/b&gt;:"));
        assert!(html.contains(" a &amp; &quot;b&quot;"));
        assert!(!html.contains("<b>"));
    }
}
