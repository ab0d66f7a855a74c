// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `palaver takeover`, `palaver release` and `palaver archive`.

use std::sync::Arc;

use palaver_agent::ChatControls;
use palaver_core::{PalaverError, StorageAdapter};
use palaver_session::ObserverHub;

fn controls(storage: Arc<dyn StorageAdapter>) -> ChatControls {
    // No observers attach to a one-shot CLI process.
    ChatControls::new(storage, Arc::new(ObserverHub::default()))
}

pub async fn run_takeover(
    storage: Arc<dyn StorageAdapter>,
    session_id: &str,
    chat_jid: &str,
    actor: &str,
) -> Result<(), PalaverError> {
    let chat = controls(storage).take_over(session_id, chat_jid, actor).await?;
    println!(
        "  {} taken over by {}",
        chat.chat_jid,
        chat.takeover_by.as_deref().unwrap_or(actor)
    );
    Ok(())
}

pub async fn run_release(
    storage: Arc<dyn StorageAdapter>,
    session_id: &str,
    chat_jid: &str,
) -> Result<(), PalaverError> {
    let chat = controls(storage).release(session_id, chat_jid).await?;
    println!("  {} released to automation", chat.chat_jid);
    Ok(())
}

pub async fn run_archive(
    storage: &dyn StorageAdapter,
    session_id: &str,
    reason: Option<&str>,
) -> Result<(), PalaverError> {
    if storage.get_device(session_id).await?.is_none() {
        return Err(PalaverError::SessionNotFound(session_id.to_string()));
    }
    storage.archive_device(session_id, reason).await?;
    println!("  {session_id} archived");
    Ok(())
}
