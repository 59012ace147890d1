//! ABOUTME: Renders a stored feedback report as an HTML Telegram message
//! ABOUTME: All user-supplied text is escaped before it reaches the chat

use chrono::{DateTime, Utc};
use sb_db::Feedback;

const NOT_SPECIFIED: &str = "Not specified";

fn emoji_for(feedback_type: &str) -> &'static str {
    match feedback_type {
        "bug" => "🐛",
        "feature" => "💡",
        "improvement" => "⚡",
        _ => "📝",
    }
}

/// Minimal escaping for Telegram's HTML parse mode
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn field(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(escape_html)
        .unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn received_at(created_at: &str) -> String {
    DateTime::parse_from_rfc3339(created_at)
        .map(|t| t.with_timezone(&Utc).format("%d.%m.%Y %H:%M:%S UTC").to_string())
        .unwrap_or_else(|_| escape_html(created_at))
}

/// Message text for a feedback report
pub fn format_feedback_message(feedback: &Feedback) -> String {
    let status = if feedback.is_authenticated {
        "Signed in"
    } else {
        "Anonymous"
    };

    let lines = [
        format!(
            "{} <b>New feedback</b>",
            emoji_for(&feedback.feedback_type)
        ),
        String::new(),
        format!(
            "📋 <b>Type:</b> {}",
            escape_html(&title_case(&feedback.feedback_type))
        ),
        format!("📝 <b>Description:</b> {}", escape_html(&feedback.description)),
        format!("💡 <b>Suggestion:</b> {}", field(&feedback.suggestion)),
        String::new(),
        "👤 <b>User:</b>".to_string(),
        format!("• Name: {}", field(&feedback.name)),
        format!("• Email: {}", field(&feedback.email)),
        format!("• Status: {}", status),
        String::new(),
        "🌐 <b>Page:</b>".to_string(),
        format!("• URL: {}", field(&feedback.page_url)),
        format!("• Title: {}", field(&feedback.page_title)),
        format!("• Browser: {}", field(&feedback.user_agent)),
        format!("• Screen: {}", field(&feedback.screen_size)),
        String::new(),
        format!("⏰ <b>Time:</b> {}", received_at(&feedback.created_at)),
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: &str) -> Feedback {
        Feedback {
            id: "01HZX".to_string(),
            feedback_type: kind.to_string(),
            description: "Button <b>broken</b> & ugly".to_string(),
            suggestion: None,
            name: Some("Aida".to_string()),
            email: Some("  ".to_string()),
            page_url: Some("/companies?page=2".to_string()),
            page_title: None,
            user_agent: None,
            screen_size: Some("1920x1080".to_string()),
            is_authenticated: true,
            status: "new".to_string(),
            admin_notes: None,
            processed_by: None,
            processed_at: None,
            created_at: "2024-03-15T10:20:30.000000Z".to_string(),
        }
    }

    #[test]
    fn test_feedback_message_layout() {
        let text = format_feedback_message(&sample("bug"));
        assert!(text.starts_with("🐛 <b>New feedback</b>"));
        assert!(text.contains("<b>Type:</b> Bug"));
        assert!(text.contains("Button &lt;b&gt;broken&lt;/b&gt; &amp; ugly"));
        assert!(text.contains("<b>Suggestion:</b> Not specified"));
        assert!(text.contains("• Email: Not specified"));
        assert!(text.contains("• Status: Signed in"));
        assert!(text.contains("15.03.2024 10:20:30 UTC"));
    }

    #[test]
    fn test_emoji_per_type() {
        assert!(format_feedback_message(&sample("feature")).starts_with("💡"));
        assert!(format_feedback_message(&sample("improvement")).starts_with("⚡"));
        assert!(format_feedback_message(&sample("whatever")).starts_with("📝"));
    }
}
