use tracing::{debug, error, info};

use crate::error::AppError;
use crate::helpers::epoch_millis;
use crate::state::State;
use crate::telegram::FileRef;

/// Download an uploaded file and record it on the session. The path is
/// recorded only after the bytes are on disk; the user ack follows the
/// record, never precedes it.
pub(crate) async fn handle_file(state: &State, chat_id: i64, file: &FileRef) -> Result<(), AppError> {
    let collecting = state
        .store
        .with_compose(chat_id, |s| s.awaiting_attachments())
        .unwrap_or(false);
    if !collecting {
        debug!(chat_id, "File outside the attachment phase ignored");
        return Ok(());
    }

    // Photos arrive without a filename; platform-supplied names are
    // reduced to their final path component before touching the disk.
    let filename = file
        .name
        .as_deref()
        .and_then(|n| std::path::Path::new(n).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("img_{}.jpg", epoch_millis()));
    let dest = state
        .config
        .download_dir
        .join(format!("{chat_id}_{}_{filename}", uuid::Uuid::new_v4()));

    let saved: Result<(), AppError> = async {
        let bytes = state.fetch_file(file).await?;
        tokio::fs::create_dir_all(&state.config.download_dir).await?;
        tokio::fs::write(&dest, &bytes).await?;
        Ok(())
    }
    .await;

    if let Err(e) = saved {
        error!(chat_id, file_id = %file.id, "Attachment save failed: {e}");
        state.metrics.inc_errors();
        return state
            .send_msg(chat_id, "❌ Failed to save that file. Try sending it again.")
            .await;
    }

    let recorded = state
        .store
        .with_compose(chat_id, |s| {
            if s.awaiting_attachments() {
                s.attachments.push(dest.clone());
                true
            } else {
                false
            }
        })
        .unwrap_or(false);
    if !recorded {
        debug!(chat_id, "Attachment phase ended during download, file dropped");
        return Ok(());
    }

    info!(chat_id, file = %dest.display(), "Attachment saved");
    state
        .send_msg(chat_id, &format!("✅ Saved: {filename}"))
        .await
}
