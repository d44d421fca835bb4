//! HTML escaping for clients that render relayed text into markup.
//!
//! The relay itself forwards text untouched.

use std::borrow::Cow;

/// Escape `&`, `<`, `>` and `"` as HTML entities.
///
/// Borrows the input when nothing needs escaping.
pub fn html_entities(input: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_borrowed() {
        assert!(matches!(html_entities("hello"), Cow::Borrowed("hello")));
    }

    #[test]
    fn escapes_all_four() {
        assert_eq!(
            html_entities(r#"<a href="x">&</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn ampersand_escaped_first() {
        assert_eq!(html_entities("&lt;"), "&amp;lt;");
    }

    #[test]
    fn single_quote_untouched() {
        assert_eq!(html_entities("it's"), "it's");
    }

    #[test]
    fn multibyte_preserved() {
        assert_eq!(html_entities("héllo <ü>"), "héllo &lt;ü&gt;");
    }
}
