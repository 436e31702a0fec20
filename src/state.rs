use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::AppError;
use crate::session::SessionStore;
use crate::telegram::FileRef;
use crate::traits::{Button, ChatApi, EmailGenerator, Mailer, Scheduler};

/// Immutable configuration set at startup from CLI args.
pub(crate) struct Config {
    pub(crate) download_dir: PathBuf,
}

/// Runtime metrics (atomic counters).
pub(crate) struct Metrics {
    pub(crate) start_time: Instant,
    pub(crate) event_count: AtomicU64,
    pub(crate) emails_sent: AtomicU64,
    pub(crate) emails_scheduled: AtomicU64,
    pub(crate) reminders_scheduled: AtomicU64,
    pub(crate) error_count: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self {
            start_time: Instant::now(),
            event_count: AtomicU64::new(0),
            emails_sent: AtomicU64::new(0),
            emails_scheduled: AtomicU64::new(0),
            reminders_scheduled: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn inc_events(&self) {
        self.event_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_emails_sent(&self) {
        self.emails_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_emails_scheduled(&self) {
        self.emails_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_reminders_scheduled(&self) {
        self.reminders_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_errors(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn events(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    pub(crate) fn emails_sent(&self) -> u64 {
        self.emails_sent.load(Ordering::Relaxed)
    }

    pub(crate) fn emails_scheduled(&self) -> u64 {
        self.emails_scheduled.load(Ordering::Relaxed)
    }

    pub(crate) fn reminders_scheduled(&self) -> u64 {
        self.reminders_scheduled.load(Ordering::Relaxed)
    }

    pub(crate) fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// Shared application state: configuration, counters, the per-chat session
/// store and the external collaborators behind their traits.
pub(crate) struct State {
    pub(crate) config: Config,
    pub(crate) metrics: Metrics,
    pub(crate) store: SessionStore,
    pub(crate) chat_api: Box<dyn ChatApi>,
    pub(crate) generator: Box<dyn EmailGenerator>,
    pub(crate) mailer: Arc<dyn Mailer>,
    pub(crate) scheduler: Box<dyn Scheduler>,
}

impl State {
    pub(crate) async fn send_msg(&self, chat_id: i64, text: &str) -> Result<(), AppError> {
        self.chat_api.send_msg(chat_id, text).await
    }

    pub(crate) async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), AppError> {
        self.chat_api.send_buttons(chat_id, text, buttons).await
    }

    pub(crate) async fn set_typing(&self, chat_id: i64) -> Result<(), AppError> {
        self.chat_api.set_typing(chat_id).await
    }

    pub(crate) async fn fetch_file(&self, file: &FileRef) -> Result<Vec<u8>, AppError> {
        self.chat_api.fetch_file(file).await
    }
}
