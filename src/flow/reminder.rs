use tracing::{debug, info};

use crate::error::AppError;
use crate::helpers::{format_time_human, parse_send_time};
use crate::mail::OutgoingMail;
use crate::session::ReminderStep;
use crate::state::State;

const REMINDER_SUBJECT: &str = "🔔 Reminder!";

enum ReminderOutcome {
    Prompt(&'static str),
    Schedule { text: String, email: String },
}

/// Three-question reminder flow: text, email, time. The reminder is sent
/// as a plain email through the same scheduler as a composed message.
pub(crate) async fn handle_text(state: &State, chat_id: i64, text: &str) -> Result<(), AppError> {
    let outcome = state.store.with_reminder(chat_id, |s| match s.step {
        ReminderStep::AwaitingText => {
            s.text = text.to_string();
            s.step = ReminderStep::AwaitingEmail;
            ReminderOutcome::Prompt("📧 Enter your email address:")
        }
        ReminderStep::AwaitingEmail => {
            s.email = text.to_string();
            s.step = ReminderStep::AwaitingTime;
            ReminderOutcome::Prompt("📅 When should I remind you? (YYYY-MM-DD HH:MM, UTC)")
        }
        ReminderStep::AwaitingTime => ReminderOutcome::Schedule {
            text: s.text.clone(),
            email: s.email.clone(),
        },
    });

    match outcome {
        Some(ReminderOutcome::Prompt(msg)) => state.send_msg(chat_id, msg).await,
        Some(ReminderOutcome::Schedule { text: body, email }) => {
            let at = match parse_send_time(text) {
                Some(at) => at,
                None => {
                    return state
                        .send_msg(chat_id, "❌ Invalid date format. Use YYYY-MM-DD HH:MM.")
                        .await;
                }
            };
            state.scheduler.schedule_send(
                at,
                OutgoingMail {
                    recipient: email.clone(),
                    subject: REMINDER_SUBJECT.to_string(),
                    body,
                    attachments: vec![],
                    tone: String::new(),
                    topic: String::new(),
                },
            );
            state.metrics.inc_reminders_scheduled();
            state.store.remove(chat_id);
            info!(chat_id, at = %at, "Reminder scheduled");
            state
                .send_msg(
                    chat_id,
                    &format!("✅ Reminder set for {}", format_time_human(&at)),
                )
                .await
        }
        None => {
            debug!(chat_id, "Reminder session vanished mid-handling");
            Ok(())
        }
    }
}
