use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::AppError;
use crate::helpers::parse_send_time;
use crate::mail::OutgoingMail;
use crate::state::State;
use crate::traits::{Mailer, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    SentNow,
    Scheduled(DateTime<Utc>),
}

/// Route a confirmed email: `now` goes straight to the mailer, anything
/// else must parse as a future-or-past timestamp and is handed to the
/// scheduler. Immediate send failures are logged and counted but not
/// surfaced; the draft is already confirmed and gone.
pub(crate) async fn dispatch_mail(
    state: &State,
    mail: OutgoingMail,
    send_time: &str,
) -> Result<Dispatch, AppError> {
    if send_time.trim().eq_ignore_ascii_case("now") {
        match state.mailer.send(&mail).await {
            Ok(()) => state.metrics.inc_emails_sent(),
            Err(e) => {
                error!(recipient = %mail.recipient, "Immediate send failed: {e}");
                state.metrics.inc_errors();
            }
        }
        return Ok(Dispatch::SentNow);
    }

    let at = parse_send_time(send_time)
        .ok_or_else(|| AppError::InvalidTime(send_time.to_string()))?;
    state.scheduler.schedule_send(at, mail);
    state.metrics.inc_emails_scheduled();
    Ok(Dispatch::Scheduled(at))
}

/// Fire-and-forget scheduler backed by a spawned task per job. Jobs live
/// only in memory; a restart drops anything pending.
pub(crate) struct TokioScheduler {
    pub(crate) mailer: Arc<dyn Mailer>,
}

impl Scheduler for TokioScheduler {
    fn schedule_send(&self, at: DateTime<Utc>, mail: OutgoingMail) {
        let mailer = Arc::clone(&self.mailer);
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        info!(at = %at, delay_secs = delay.as_secs(), recipient = %mail.recipient, "Scheduling send");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match mailer.send(&mail).await {
                Ok(()) => info!(recipient = %mail.recipient, "Scheduled email sent"),
                Err(e) => error!(recipient = %mail.recipient, "Scheduled send failed: {e}"),
            }
        });
    }
}
