use dashmap::DashMap;
use std::path::PathBuf;
use tracing::info;

use crate::telegram::Tone;

/// Position in the Composing flow. Each state names the input it is
/// waiting for; transitions live in the flow module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComposeStep {
    AwaitingSenderName,
    AwaitingRole,
    AwaitingTone,
    AwaitingTopic,
    AwaitingSubject,
    AwaitingRecipient,
    CollectingAttachments,
    AwaitingSendTime,
    AwaitingConfirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReminderStep {
    AwaitingText,
    AwaitingEmail,
    AwaitingTime,
}

/// Fields collected one step at a time during the Composing flow.
#[derive(Debug, Clone, Default)]
pub(crate) struct Draft {
    pub(crate) sender_name: String,
    pub(crate) role: String,
    pub(crate) tone: Option<Tone>,
    pub(crate) topic: String,
    pub(crate) subject: String,
    pub(crate) recipient: String,
    pub(crate) send_time: String,
    pub(crate) final_subject: String,
    pub(crate) generated_body: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ComposeSession {
    pub(crate) step: ComposeStep,
    pub(crate) draft: Draft,
    pub(crate) attachments: Vec<PathBuf>,
}

impl ComposeSession {
    fn new() -> Self {
        Self {
            step: ComposeStep::AwaitingSenderName,
            draft: Draft::default(),
            attachments: Vec::new(),
        }
    }

    pub(crate) fn awaiting_attachments(&self) -> bool {
        self.step == ComposeStep::CollectingAttachments
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ReminderSession {
    pub(crate) step: ReminderStep,
    pub(crate) text: String,
    pub(crate) email: String,
}

impl ReminderSession {
    fn new() -> Self {
        Self {
            step: ReminderStep::AwaitingText,
            text: String::new(),
            email: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Session {
    Compose(ComposeSession),
    Reminder(ReminderSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionKind {
    Compose,
    Reminder,
}

/// In-memory per-chat session store. A session exists iff a flow is in
/// progress for that chat; starting a flow unconditionally overwrites any
/// existing session (a start trigger always restarts).
pub(crate) struct SessionStore {
    inner: DashMap<i64, Session>,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub(crate) fn start_compose(&self, chat_id: i64) {
        if self.inner.contains_key(&chat_id) {
            info!(chat_id, "Restarting session");
        }
        self.inner
            .insert(chat_id, Session::Compose(ComposeSession::new()));
    }

    pub(crate) fn start_reminder(&self, chat_id: i64) {
        if self.inner.contains_key(&chat_id) {
            info!(chat_id, "Restarting session");
        }
        self.inner
            .insert(chat_id, Session::Reminder(ReminderSession::new()));
    }

    pub(crate) fn remove(&self, chat_id: i64) -> Option<Session> {
        self.inner.remove(&chat_id).map(|(_, s)| s)
    }

    pub(crate) fn kind(&self, chat_id: i64) -> Option<SessionKind> {
        self.inner.get(&chat_id).map(|s| match *s {
            Session::Compose(_) => SessionKind::Compose,
            Session::Reminder(_) => SessionKind::Reminder,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    /// Run a closure against the chat's Compose session. The map guard is
    /// released before this returns; never call from within another
    /// `with_*` closure for the same chat.
    pub(crate) fn with_compose<R>(
        &self,
        chat_id: i64,
        f: impl FnOnce(&mut ComposeSession) -> R,
    ) -> Option<R> {
        let mut entry = self.inner.get_mut(&chat_id)?;
        match entry.value_mut() {
            Session::Compose(s) => Some(f(s)),
            Session::Reminder(_) => None,
        }
    }

    pub(crate) fn with_reminder<R>(
        &self,
        chat_id: i64,
        f: impl FnOnce(&mut ReminderSession) -> R,
    ) -> Option<R> {
        let mut entry = self.inner.get_mut(&chat_id)?;
        match entry.value_mut() {
            Session::Reminder(s) => Some(f(s)),
            Session::Compose(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_compose_creates_at_first_step() {
        let store = SessionStore::new();
        store.start_compose(1);
        assert_eq!(store.kind(1), Some(SessionKind::Compose));
        let step = store.with_compose(1, |s| s.step).unwrap();
        assert_eq!(step, ComposeStep::AwaitingSenderName);
    }

    #[test]
    fn test_start_reminder_creates_at_first_step() {
        let store = SessionStore::new();
        store.start_reminder(2);
        assert_eq!(store.kind(2), Some(SessionKind::Reminder));
        let step = store.with_reminder(2, |s| s.step).unwrap();
        assert_eq!(step, ReminderStep::AwaitingText);
    }

    #[test]
    fn test_start_overwrites_existing_session() {
        let store = SessionStore::new();
        store.start_compose(1);
        store.with_compose(1, |s| {
            s.draft.sender_name = "Alice".to_string();
            s.step = ComposeStep::AwaitingTopic;
        });
        store.start_compose(1);
        let (step, name) = store
            .with_compose(1, |s| (s.step, s.draft.sender_name.clone()))
            .unwrap();
        assert_eq!(step, ComposeStep::AwaitingSenderName);
        assert!(name.is_empty(), "restart must discard collected data");
    }

    #[test]
    fn test_start_switches_mode() {
        let store = SessionStore::new();
        store.start_compose(1);
        store.start_reminder(1);
        assert_eq!(store.kind(1), Some(SessionKind::Reminder));
    }

    #[test]
    fn test_remove_deletes() {
        let store = SessionStore::new();
        store.start_compose(1);
        assert!(store.remove(1).is_some());
        assert_eq!(store.kind(1), None);
        assert!(store.remove(1).is_none());
    }

    #[test]
    fn test_with_compose_wrong_mode_is_none() {
        let store = SessionStore::new();
        store.start_reminder(1);
        assert!(store.with_compose(1, |_| ()).is_none());
        assert!(store.with_reminder(1, |_| ()).is_some());
    }

    #[test]
    fn test_with_compose_absent_chat_is_none() {
        let store = SessionStore::new();
        assert!(store.with_compose(99, |_| ()).is_none());
    }

    #[test]
    fn test_sessions_are_per_chat() {
        let store = SessionStore::new();
        store.start_compose(1);
        store.start_compose(2);
        store.with_compose(1, |s| s.draft.topic = "one".to_string());
        let topic2 = store.with_compose(2, |s| s.draft.topic.clone()).unwrap();
        assert!(topic2.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_awaiting_attachments_flag() {
        let store = SessionStore::new();
        store.start_compose(1);
        assert!(!store
            .with_compose(1, |s| s.awaiting_attachments())
            .unwrap());
        store.with_compose(1, |s| s.step = ComposeStep::CollectingAttachments);
        assert!(store.with_compose(1, |s| s.awaiting_attachments()).unwrap());
    }
}
