use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::AppError;
use crate::mail::OutgoingMail;
use crate::telegram::FileRef;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Button {
    pub(crate) label: String,
    pub(crate) data: String,
}

impl Button {
    pub(crate) fn new(label: &str, data: &str) -> Self {
        Self {
            label: label.to_string(),
            data: data.to_string(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait ChatApi: Send + Sync {
    async fn send_msg(&self, chat_id: i64, text: &str) -> Result<(), AppError>;
    async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), AppError>;
    async fn set_typing(&self, chat_id: i64) -> Result<(), AppError>;
    async fn fetch_file(&self, file: &FileRef) -> Result<Vec<u8>, AppError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait EmailGenerator: Send + Sync {
    async fn generate(
        &self,
        role: &str,
        tone: &str,
        topic: &str,
        subject: &str,
    ) -> Result<String, AppError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), AppError>;
}

/// One-shot deferred execution. Registration is the end of the core's
/// responsibility; there is no cancellation or rescheduling API.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Scheduler: Send + Sync {
    fn schedule_send(&self, at: DateTime<Utc>, mail: OutgoingMail);
}

pub(crate) struct TelegramApiImpl {
    pub(crate) http: Client,
    pub(crate) api_url: String,
    pub(crate) token: String,
}

impl TelegramApiImpl {
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token)
    }
}

#[async_trait]
impl ChatApi for TelegramApiImpl {
    async fn send_msg(&self, chat_id: i64, text: &str) -> Result<(), AppError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Telegram send failed");
            return Err(AppError::Telegram(format!("send failed: {status}")));
        }
        Ok(())
    }

    async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), AppError> {
        let keyboard: Vec<Vec<Value>> = buttons
            .iter()
            .map(|b| vec![serde_json::json!({ "text": b.label, "callback_data": b.data })])
            .collect();
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "reply_markup": { "inline_keyboard": keyboard },
        });
        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AppError::Telegram(format!("send failed: {status}")));
        }
        Ok(())
    }

    async fn set_typing(&self, chat_id: i64) -> Result<(), AppError> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let resp = self
            .http
            .post(self.method_url("sendChatAction"))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            debug!("Typing indicator failed: {}", resp.status());
        }
        Ok(())
    }

    async fn fetch_file(&self, file: &FileRef) -> Result<Vec<u8>, AppError> {
        let resp = self
            .http
            .get(self.method_url("getFile"))
            .query(&[("file_id", file.id.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Telegram(format!(
                "getFile {} failed: {}",
                file.id,
                resp.status()
            )));
        }
        let parsed: Value = resp.json().await?;
        let file_path = parsed["result"]["file_path"]
            .as_str()
            .ok_or_else(|| AppError::Telegram(format!("no file_path for {}", file.id)))?
            .to_string();

        let url = format!("{}/file/bot{}/{file_path}", self.api_url, self.token);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Telegram(format!(
                "download {} failed: {}",
                file.id,
                resp.status()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

pub(crate) struct GenAiClient {
    pub(crate) http: Client,
    pub(crate) api_url: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
}

pub(crate) fn build_generation_prompt(role: &str, tone: &str, topic: &str, subject: &str) -> String {
    format!(
        "Write a {tone} email about {topic}. The subject is \"{subject}\" and the author \
         is a {role}. Write only the email body, without salutation or signature."
    )
}

#[async_trait]
impl EmailGenerator for GenAiClient {
    async fn generate(
        &self,
        role: &str,
        tone: &str,
        topic: &str,
        subject: &str,
    ) -> Result<String, AppError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": build_generation_prompt(role, tone, topic, subject) }
            ],
        });
        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %crate::helpers::truncate(&body, 200), "Generation request failed");
            return Err(AppError::Generate(format!("request failed: {status}")));
        }
        let parsed: Value = resp.json().await?;
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| AppError::Generate("malformed response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telegram_api(server: &wiremock::MockServer) -> TelegramApiImpl {
        TelegramApiImpl {
            http: Client::new(),
            api_url: server.uri(),
            token: "TESTTOKEN".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_msg_success() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/botTESTTOKEN/sendMessage"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let api = telegram_api(&server);
        assert!(api.send_msg(42, "hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_send_msg_failure_is_telegram_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/botTESTTOKEN/sendMessage"))
            .respond_with(wiremock::ResponseTemplate::new(502).set_body_string("gateway"))
            .mount(&server)
            .await;
        let api = telegram_api(&server);
        let err = api.send_msg(42, "hello").await.unwrap_err();
        assert!(matches!(err, AppError::Telegram(_)));
    }

    #[tokio::test]
    async fn test_send_buttons_success() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/botTESTTOKEN/sendMessage"))
            .and(wiremock::matchers::body_string_contains("inline_keyboard"))
            .and(wiremock::matchers::body_string_contains("done_upload"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let api = telegram_api(&server);
        let buttons = vec![Button::new("✅ Done Uploading", "done_upload")];
        assert!(api.send_buttons(42, "Upload files", &buttons).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_typing_tolerates_failure() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/botTESTTOKEN/sendChatAction"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let api = telegram_api(&server);
        assert!(api.set_typing(42).await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_file_two_step_download() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/botTESTTOKEN/getFile"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "ok": true, "result": { "file_path": "documents/file_7.pdf" } }),
            ))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path(
                "/file/botTESTTOKEN/documents/file_7.pdf",
            ))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(b"pdf bytes".to_vec()))
            .mount(&server)
            .await;
        let api = telegram_api(&server);
        let bytes = api
            .fetch_file(&FileRef {
                id: "f7".to_string(),
                name: Some("file_7.pdf".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"pdf bytes");
    }

    #[tokio::test]
    async fn test_fetch_file_missing_path_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/botTESTTOKEN/getFile"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "ok": false })),
            )
            .mount(&server)
            .await;
        let api = telegram_api(&server);
        let err = api
            .fetch_file(&FileRef {
                id: "missing".to_string(),
                name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Telegram(_)));
    }

    #[test]
    fn test_build_generation_prompt_mentions_all_fields() {
        let prompt = build_generation_prompt("Engineer", "Formal", "Q3 roadmap", "Regarding: Q3");
        assert!(prompt.contains("Formal"));
        assert!(prompt.contains("Q3 roadmap"));
        assert!(prompt.contains("Engineer"));
        assert!(prompt.contains("Regarding: Q3"));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/chat/completions"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [ { "message": { "content": "  Here is the email body.  " } } ]
            })))
            .mount(&server)
            .await;
        let client = GenAiClient {
            http: Client::new(),
            api_url: server.uri(),
            api_key: "key".to_string(),
            model: "test-model".to_string(),
        };
        let body = client
            .generate("Engineer", "Formal", "Q3 roadmap", "Regarding: Q3 roadmap")
            .await
            .unwrap();
        assert_eq!(body, "Here is the email body.");
    }

    #[tokio::test]
    async fn test_generate_http_failure() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/chat/completions"))
            .respond_with(wiremock::ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;
        let client = GenAiClient {
            http: Client::new(),
            api_url: server.uri(),
            api_key: "key".to_string(),
            model: "test-model".to_string(),
        };
        let err = client.generate("r", "t", "topic", "s").await.unwrap_err();
        assert!(matches!(err, AppError::Generate(_)));
    }

    #[tokio::test]
    async fn test_generate_malformed_response() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/chat/completions"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;
        let client = GenAiClient {
            http: Client::new(),
            api_url: server.uri(),
            api_key: "key".to_string(),
            model: "test-model".to_string(),
        };
        let err = client.generate("r", "t", "topic", "s").await.unwrap_err();
        assert!(matches!(err, AppError::Generate(_)));
    }
}
