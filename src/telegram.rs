use serde_json::Value;

/// Reference to a file hosted by the chat platform, resolvable to bytes
/// via `ChatApi::fetch_file`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FileRef {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tone {
    Formal,
    Casual,
}

impl Tone {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Tone::Formal => "Formal",
            Tone::Casual => "Casual",
        }
    }
}

/// A structured button press, as opposed to free-form text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Tone(Tone),
    DoneUploading,
    ConfirmSendNow,
    Discard,
}

impl Action {
    pub(crate) fn from_data(data: &str) -> Option<Action> {
        match data {
            "Formal" => Some(Action::Tone(Tone::Formal)),
            "Casual" => Some(Action::Tone(Tone::Casual)),
            "done_upload" => Some(Action::DoneUploading),
            "confirm_send_now" => Some(Action::ConfirmSendNow),
            "discard" => Some(Action::Discard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EventKind {
    Text(String),
    Action(Action),
    File(FileRef),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InboundEvent {
    pub(crate) chat_id: i64,
    pub(crate) kind: EventKind,
}

/// Parse a Telegram update JSON into a structured event.
/// Returns None for updates that should be skipped (no chat id, unknown
/// callback data, empty messages, edits, etc.)
pub(crate) fn parse_update(update: &Value) -> Option<InboundEvent> {
    if let Some(query) = update.get("callback_query") {
        let chat_id = query["message"]["chat"]["id"].as_i64()?;
        let action = Action::from_data(query["data"].as_str()?)?;
        return Some(InboundEvent {
            chat_id,
            kind: EventKind::Action(action),
        });
    }

    let message = update.get("message")?;
    let chat_id = message["chat"]["id"].as_i64()?;

    if let Some(doc) = message.get("document") {
        let id = doc["file_id"].as_str()?.to_string();
        let name = doc["file_name"].as_str().map(|s| s.to_string());
        return Some(InboundEvent {
            chat_id,
            kind: EventKind::File(FileRef { id, name }),
        });
    }

    // Photos arrive as an array of sizes; the last entry is the largest.
    if let Some(sizes) = message["photo"].as_array() {
        let id = sizes.last()?["file_id"].as_str()?.to_string();
        return Some(InboundEvent {
            chat_id,
            kind: EventKind::File(FileRef { id, name: None }),
        });
    }

    match message["text"].as_str() {
        Some(t) if !t.trim().is_empty() => Some(InboundEvent {
            chat_id,
            kind: EventKind::Text(t.trim().to_string()),
        }),
        _ => None,
    }
}
