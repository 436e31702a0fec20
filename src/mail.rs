use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::compose::recommend_subject;
use crate::error::AppError;
use crate::traits::Mailer;

const BOUNDARY: &str = "__MAILBOT_BOUNDARY__";

/// Assembled payload handed to the mail collaborator. Tone and topic ride
/// along for the blank-subject recommendation fallback.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OutgoingMail {
    pub(crate) recipient: String,
    pub(crate) subject: String,
    pub(crate) body: String,
    pub(crate) attachments: Vec<PathBuf>,
    pub(crate) tone: String,
    pub(crate) topic: String,
}

/// Gmail send token, loaded once at startup and passed to the mailer by
/// reference. Never re-derived per call.
#[derive(Debug, Clone)]
pub(crate) struct MailCredentials {
    pub(crate) access_token: String,
}

#[derive(Deserialize)]
struct StoredToken {
    access_token: String,
}

impl MailCredentials {
    /// Load from a base64-encoded token JSON in the environment, falling
    /// back to a token file on disk.
    pub(crate) fn load(token_file: &Path, env_b64: Option<String>) -> Result<Self, AppError> {
        let raw = match env_b64 {
            Some(b64) => base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map_err(|e| AppError::Mail(format!("invalid token base64: {e}")))?,
            None => std::fs::read(token_file)?,
        };
        let token: StoredToken = serde_json::from_slice(&raw)?;
        Ok(Self {
            access_token: token.access_token,
        })
    }
}

pub(crate) fn mime_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        "doc" | "docx" => "application/msword",
        "ppt" | "pptx" => "application/vnd.ms-powerpoint",
        _ => "application/octet-stream",
    }
}

/// Build the raw RFC 2822 message: plain-text part plus one base64 part per
/// attachment. Unreadable attachment files are skipped with a warning.
pub(crate) fn build_mime(
    recipient: &str,
    subject: &str,
    body: &str,
    attachments: &[PathBuf],
) -> String {
    let mut parts = vec![
        format!("To: {recipient}"),
        format!("Subject: {subject}"),
        "MIME-Version: 1.0".to_string(),
        format!("Content-Type: multipart/mixed; boundary=\"{BOUNDARY}\"\n"),
        format!("--{BOUNDARY}"),
        "Content-Type: text/plain; charset=\"UTF-8\"".to_string(),
        "Content-Transfer-Encoding: 7bit\n".to_string(),
        body.to_string(),
    ];

    for path in attachments {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!(file = %path.display(), "Skipping unreadable attachment: {e}");
                continue;
            }
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let mime = mime_type_for(&filename);
        let b64 = base64::engine::general_purpose::STANDARD.encode(&data);
        parts.push(format!("--{BOUNDARY}"));
        parts.push(format!("Content-Type: {mime}; name=\"{filename}\""));
        parts.push("Content-Transfer-Encoding: base64".to_string());
        parts.push(format!(
            "Content-Disposition: attachment; filename=\"{filename}\"\n"
        ));
        parts.push(b64);
    }

    parts.push(format!("--{BOUNDARY}--"));
    parts.join("\n")
}

fn encode_message(raw: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

pub(crate) fn effective_subject(mail: &OutgoingMail) -> String {
    if mail.subject.trim().is_empty() {
        let subject = recommend_subject(&mail.topic, &mail.tone);
        info!(subject = %subject, "Using recommended subject");
        subject
    } else {
        mail.subject.clone()
    }
}

pub(crate) struct GmailMailer {
    pub(crate) http: Client,
    pub(crate) api_url: String,
    pub(crate) credentials: MailCredentials,
}

#[async_trait::async_trait]
impl Mailer for GmailMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), AppError> {
        let subject = effective_subject(mail);
        let raw = build_mime(&mail.recipient, &subject, &mail.body, &mail.attachments);
        let url = format!("{}/gmail/v1/users/me/messages/send", self.api_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.credentials.access_token)
            .json(&serde_json::json!({ "raw": encode_message(&raw) }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Gmail send failed");
            return Err(AppError::Mail(format!("send rejected: {status}")));
        }
        info!(recipient = %mail.recipient, "Email submitted");
        Ok(())
    }
}
