pub(crate) mod attachments;
pub(crate) mod reminder;


use tracing::debug;

use crate::compose::{build_preview, resolve_subject, wrap_body};
use crate::error::AppError;
use crate::helpers::{format_time_human, is_command, parse_send_time};
use crate::mail::OutgoingMail;
use crate::schedule::{dispatch_mail, Dispatch};
use crate::session::{ComposeStep, SessionKind};
use crate::state::State;
use crate::telegram::{Action, EventKind, InboundEvent, Tone};
use crate::traits::Button;

const PROMPT_SEND_TIME: &str =
    "📅 When should I send the email? Type `now` or a time like `2025-07-01 12:00` (UTC).";

/// Top-level event dispatch: commands always win, everything else is routed
/// by the chat's current session.
pub(crate) async fn handle_event(state: &State, event: InboundEvent) -> Result<(), AppError> {
    state.metrics.inc_events();
    let chat_id = event.chat_id;
    match event.kind {
        EventKind::Text(text) if is_command(&text) => handle_command(state, chat_id, &text).await,
        EventKind::Text(text) => handle_text(state, chat_id, &text).await,
        EventKind::Action(action) => handle_action(state, chat_id, action).await,
        EventKind::File(file) => attachments::handle_file(state, chat_id, &file).await,
    }
}

async fn handle_command(state: &State, chat_id: i64, text: &str) -> Result<(), AppError> {
    match text.trim().split_whitespace().next().unwrap_or_default() {
        "/start" => {
            state.store.start_compose(chat_id);
            state.send_msg(chat_id, "👋 What is your name?").await
        }
        "/remindme" => {
            state.store.start_reminder(chat_id);
            state
                .send_msg(chat_id, "🔔 What should I remind you about?")
                .await
        }
        "/cancel" => {
            let reply = if state.store.remove(chat_id).is_some() {
                "🗑️ Cancelled."
            } else {
                "Nothing to cancel."
            };
            state.send_msg(chat_id, reply).await
        }
        other => {
            debug!(chat_id, command = %other, "Unknown command ignored");
            Ok(())
        }
    }
}

async fn handle_text(state: &State, chat_id: i64, text: &str) -> Result<(), AppError> {
    match state.store.kind(chat_id) {
        Some(SessionKind::Compose) => handle_compose_text(state, chat_id, text).await,
        Some(SessionKind::Reminder) => reminder::handle_text(state, chat_id, text).await,
        None => {
            debug!(chat_id, "Text without an active session ignored");
            Ok(())
        }
    }
}

/// What the session step machine decided to do with a text input. Produced
/// inside the store closure so the map guard is gone before any awaits.
enum TextOutcome {
    Prompt(&'static str),
    PromptButtons(&'static str, Vec<Button>),
    Generate(GenerateInput),
    Ignore(ComposeStep),
}

struct GenerateInput {
    sender_name: String,
    role: String,
    tone: String,
    topic: String,
    subject: String,
    recipient: String,
}

async fn handle_compose_text(state: &State, chat_id: i64, text: &str) -> Result<(), AppError> {
    let outcome = state.store.with_compose(chat_id, |s| match s.step {
        ComposeStep::AwaitingSenderName => {
            s.draft.sender_name = text.to_string();
            s.step = ComposeStep::AwaitingRole;
            TextOutcome::Prompt("🧑‍💼 What is your role? (e.g., Developer, Student)")
        }
        ComposeStep::AwaitingRole => {
            s.draft.role = text.to_string();
            s.step = ComposeStep::AwaitingTone;
            TextOutcome::PromptButtons(
                "✉️ Choose the tone of the email:",
                vec![
                    Button::new("Formal", "Formal"),
                    Button::new("Casual", "Casual"),
                ],
            )
        }
        ComposeStep::AwaitingTopic => {
            s.draft.topic = text.to_string();
            s.step = ComposeStep::AwaitingSubject;
            TextOutcome::Prompt("📌 Enter the subject (or type `auto` for a suggestion):")
        }
        ComposeStep::AwaitingSubject => {
            s.draft.subject = text.to_string();
            s.step = ComposeStep::AwaitingRecipient;
            TextOutcome::Prompt("📬 Enter the recipient's email address:")
        }
        ComposeStep::AwaitingRecipient => {
            s.draft.recipient = text.to_string();
            s.step = ComposeStep::CollectingAttachments;
            TextOutcome::PromptButtons(
                "📎 Upload attachments (optional). Tap *Done* when finished.",
                vec![Button::new("✅ Done Uploading", "done_upload")],
            )
        }
        ComposeStep::AwaitingSendTime => {
            let token = text.trim().to_string();
            if !token.eq_ignore_ascii_case("now") && parse_send_time(&token).is_none() {
                return TextOutcome::Prompt(
                    "❌ I couldn't read that time. Type `now` or something like `2025-07-01 12:00`.",
                );
            }
            s.draft.send_time = token;
            TextOutcome::Generate(GenerateInput {
                sender_name: s.draft.sender_name.clone(),
                role: s.draft.role.clone(),
                tone: s.draft.tone.map(|t| t.as_str().to_string()).unwrap_or_default(),
                topic: s.draft.topic.clone(),
                subject: s.draft.subject.clone(),
                recipient: s.draft.recipient.clone(),
            })
        }
        step => TextOutcome::Ignore(step),
    });

    match outcome {
        Some(TextOutcome::Prompt(msg)) => state.send_msg(chat_id, msg).await,
        Some(TextOutcome::PromptButtons(msg, buttons)) => {
            state.send_buttons(chat_id, msg, &buttons).await
        }
        Some(TextOutcome::Generate(input)) => generate_and_preview(state, chat_id, input).await,
        Some(TextOutcome::Ignore(step)) => {
            debug!(chat_id, ?step, "Text not expected at this step, ignored");
            Ok(())
        }
        None => {
            debug!(chat_id, "Compose session vanished mid-handling");
            Ok(())
        }
    }
}

/// The long tail of the flow: call the generator, wrap the result into a
/// letter, persist it on the session and show the preview with the final
/// confirm/discard choice. The session stays at the send-time step until
/// generation succeeds, so a failed call can simply be retried.
async fn generate_and_preview(
    state: &State,
    chat_id: i64,
    input: GenerateInput,
) -> Result<(), AppError> {
    if let Err(e) = state.set_typing(chat_id).await {
        debug!(chat_id, "Typing indicator failed: {e}");
    }
    state
        .send_msg(chat_id, "✍️ Generating your email, please wait...")
        .await?;

    let subject = resolve_subject(&input.subject, &input.topic, &input.tone);
    let generated = match state
        .generator
        .generate(&input.role, &input.tone, &input.topic, &subject)
        .await
    {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(chat_id, "Email generation failed: {e}");
            state.metrics.inc_errors();
            return state
                .send_msg(chat_id, "❌ Failed to generate the email. Send the time again to retry.")
                .await;
        }
    };

    let body = wrap_body(&input.recipient, &generated, &input.sender_name, &input.role);
    let stored = state.store.with_compose(chat_id, |s| {
        s.draft.final_subject = subject.clone();
        s.draft.generated_body = body.clone();
        s.step = ComposeStep::AwaitingConfirmation;
    });
    if stored.is_none() {
        debug!(chat_id, "Compose session gone after generation, dropping result");
        return Ok(());
    }

    state
        .send_msg(chat_id, &build_preview(&subject, &input.recipient, &body))
        .await?;
    state
        .send_buttons(
            chat_id,
            "✅ Confirm sending this email?",
            &[
                Button::new("📤 Send Now", "confirm_send_now"),
                Button::new("❌ Discard", "discard"),
            ],
        )
        .await
}

async fn handle_action(state: &State, chat_id: i64, action: Action) -> Result<(), AppError> {
    match action {
        Action::Tone(tone) => handle_tone(state, chat_id, tone).await,
        Action::DoneUploading => handle_done_uploading(state, chat_id).await,
        Action::ConfirmSendNow => handle_confirm(state, chat_id).await,
        Action::Discard => handle_discard(state, chat_id).await,
    }
}

async fn handle_tone(state: &State, chat_id: i64, tone: Tone) -> Result<(), AppError> {
    let accepted = state
        .store
        .with_compose(chat_id, |s| {
            if s.step == ComposeStep::AwaitingTone {
                s.draft.tone = Some(tone);
                s.step = ComposeStep::AwaitingTopic;
                true
            } else {
                false
            }
        })
        .unwrap_or(false);

    if !accepted {
        debug!(chat_id, "Stale tone button ignored");
        return Ok(());
    }
    state
        .send_msg(
            chat_id,
            &format!("📝 What is the topic of the email? (Tone: {})", tone.as_str()),
        )
        .await
}

async fn handle_done_uploading(state: &State, chat_id: i64) -> Result<(), AppError> {
    let accepted = state
        .store
        .with_compose(chat_id, |s| {
            if s.step == ComposeStep::CollectingAttachments {
                s.step = ComposeStep::AwaitingSendTime;
                true
            } else {
                false
            }
        })
        .unwrap_or(false);

    if !accepted {
        debug!(chat_id, "Stale done-uploading button ignored");
        return Ok(());
    }
    state.send_msg(chat_id, PROMPT_SEND_TIME).await
}

async fn handle_confirm(state: &State, chat_id: i64) -> Result<(), AppError> {
    let confirmed = state.store.with_compose(chat_id, |s| {
        if s.step != ComposeStep::AwaitingConfirmation {
            return None;
        }
        Some((
            OutgoingMail {
                recipient: s.draft.recipient.clone(),
                subject: s.draft.final_subject.clone(),
                body: s.draft.generated_body.clone(),
                attachments: s.attachments.clone(),
                tone: s.draft.tone.map(|t| t.as_str().to_string()).unwrap_or_default(),
                topic: s.draft.topic.clone(),
            },
            s.draft.send_time.clone(),
        ))
    });

    let (mail, send_time) = match confirmed.flatten() {
        Some(pair) => pair,
        None => {
            debug!(chat_id, "Stale confirm button ignored");
            return Ok(());
        }
    };

    match dispatch_mail(state, mail, &send_time).await {
        Ok(Dispatch::SentNow) => {
            state.store.remove(chat_id);
            state.send_msg(chat_id, "✅ Email sent!").await
        }
        Ok(Dispatch::Scheduled(at)) => {
            state.store.remove(chat_id);
            state
                .send_msg(
                    chat_id,
                    &format!("📤 Email scheduled for {}", format_time_human(&at)),
                )
                .await
        }
        // Validated when the time was typed, but the session is the source
        // of truth; fall back to asking again rather than dropping the draft.
        Err(AppError::InvalidTime(_)) => {
            let _ = state
                .store
                .with_compose(chat_id, |s| s.step = ComposeStep::AwaitingSendTime);
            state.send_msg(chat_id, PROMPT_SEND_TIME).await
        }
        Err(e) => Err(e),
    }
}

async fn handle_discard(state: &State, chat_id: i64) -> Result<(), AppError> {
    let at_confirmation = state
        .store
        .with_compose(chat_id, |s| s.step == ComposeStep::AwaitingConfirmation)
        .unwrap_or(false);
    if !at_confirmation {
        debug!(chat_id, "Stale discard button ignored");
        return Ok(());
    }
    state.store.remove(chat_id);
    state.send_msg(chat_id, "🗑️ Email discarded.").await
}
