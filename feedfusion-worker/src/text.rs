use chrono::{Duration, NaiveDateTime};

/// Escapes the three characters Telegram's HTML parse mode reserves.
pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders one news item as the HTML message the chat transport sends.
/// `timezone_offset_hours` shifts the stored UTC timestamp for display
/// only; `empty_text` marks a summary that was never present upstream and
/// is therefore suppressed.
pub fn format_message(
    title: &str,
    published: NaiveDateTime,
    summary: &str,
    link: &str,
    source: &str,
    empty_text: &str,
    timezone_offset_hours: i32,
) -> String {
    let summary_block = if summary.is_empty() || summary == empty_text {
        String::new()
    } else {
        format!("\n{}\n", escape_html(summary))
    };

    let local = published + Duration::hours(timezone_offset_hours as i64);

    format!(
        "\n\u{1F4CC} <i><b>{}</b></i>\n{}\u{1F4C5} <b>{}</b>\n\u{1F517} <b><a href=\"{}\">{}, read</a></b>\n",
        escape_html(title),
        summary_block,
        local.format("%d.%m.%Y %H:%M"),
        link,
        escape_html(source),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn includes_title_link_and_shifted_timestamp() {
        let message = format_message(
            "Big news",
            noon(),
            "Something happened",
            "https://example.com/a",
            "Example Wire",
            "N/A",
            5,
        );

        assert!(message.contains("<b>Big news</b>"));
        assert!(message.contains("Something happened"));
        assert!(message.contains("01.03.2026 17:00"));
        assert!(message.contains("href=\"https://example.com/a\""));
        assert!(message.contains("Example Wire, read"));
    }

    #[test]
    fn placeholder_summary_is_suppressed() {
        let message = format_message(
            "Big news",
            noon(),
            "N/A",
            "https://example.com/a",
            "Example Wire",
            "N/A",
            0,
        );
        assert!(!message.contains("N/A"));
    }

    #[test]
    fn html_in_fields_is_escaped() {
        let message = format_message(
            "Tags <b>everywhere</b>",
            noon(),
            "a & b",
            "https://example.com/a",
            "Wire",
            "N/A",
            0,
        );
        assert!(message.contains("Tags &lt;b&gt;everywhere&lt;/b&gt;"));
        assert!(message.contains("a &amp; b"));
    }
}
