use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]*>").expect("tag pattern is valid");
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
}

/// Reduces an HTML fragment to plain text: tags removed, the handful of
/// entities feeds actually use unescaped, whitespace collapsed.
pub fn strip_html(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, " ");
    let unescaped = unescape_entities(&without_tags);
    WHITESPACE_RE
        .replace_all(unescaped.trim(), " ")
        .into_owned()
}

fn unescape_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags() {
        assert_eq!(
            strip_html("<p>Hello <b>world</b></p>"),
            "Hello world"
        );
    }

    #[test]
    fn unescapes_common_entities() {
        assert_eq!(
            strip_html("Fish &amp; chips &lt;fresh&gt;"),
            "Fish & chips <fresh>"
        );
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(
            strip_html("  <div>\n  spaced\t\tout  </div>  "),
            "spaced out"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(strip_html("already plain"), "already plain");
    }
}
