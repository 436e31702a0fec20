//! Pure text assembly for the email flow: subject recommendation, the
//! salutation-wrapped letter body, and the preview shown before sending.

pub(crate) fn recommend_subject(topic: &str, tone: &str) -> String {
    match tone {
        "Formal" => format!("Regarding: {topic}"),
        "Casual" => format!("Let's talk about {topic}"),
        _ => format!("Subject: {topic}"),
    }
}

/// Resolve the final subject: a blank subject or the literal `auto` defers
/// to the recommendation keyed by topic and tone.
pub(crate) fn resolve_subject(subject: &str, topic: &str, tone: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() || subject.eq_ignore_ascii_case("auto") {
        recommend_subject(topic, tone)
    } else {
        subject.to_string()
    }
}

pub(crate) fn wrap_body(recipient: &str, generated: &str, sender_name: &str, role: &str) -> String {
    format!("Dear {recipient},\n\n{generated}\n\nSincerely,\n{sender_name}\n{role}")
}

pub(crate) fn build_preview(subject: &str, recipient: &str, body: &str) -> String {
    format!("📝 *Email Preview:*\n\n*Subject:* {subject}\n*To:* {recipient}\n\n{body}")
}
