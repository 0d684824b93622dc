//! Handlers that mutate sessions: new, send, rename, delete.

use anyhow::Result;
use galgo_core::lifecycle::SessionLifecycleManager;
use galgo_core::loader::Sender;

pub async fn new(manager: &mut SessionLifecycleManager) -> Result<()> {
    let id = manager.create().await;
    println!("Created session {id}");
    Ok(())
}

pub async fn send(
    manager: &mut SessionLifecycleManager,
    text: &str,
    session: Option<&str>,
) -> Result<()> {
    if let Some(id) = session {
        if !manager.catalog().iter().any(|s| s.id == id) {
            anyhow::bail!("Session '{id}' not found");
        }
        manager.select(id);
    }

    // Without --session this lands in the session selected at sign-in:
    // the newest one, or a fresh draft when the catalog is empty.
    let before = manager.messages().len();
    manager.append_message(text).await;
    if manager.messages().len() == before {
        anyhow::bail!("Nothing to send: message is blank");
    }

    match manager.messages().last() {
        Some(m) if m.sender == Sender::Assistant => println!("{}", m.text),
        _ => println!("(no reply)"),
    }
    Ok(())
}

pub async fn rename(manager: &mut SessionLifecycleManager, id: &str, title: &str) -> Result<()> {
    if !manager.catalog().iter().any(|s| s.id == id) {
        anyhow::bail!("Session '{id}' not found");
    }
    let title = title.trim();
    if title.is_empty() {
        anyhow::bail!("Title is blank");
    }

    manager.rename(id, title).await;

    // The engine only applies a rename the store acknowledged.
    let current = manager
        .catalog()
        .iter()
        .find(|s| s.id == id)
        .and_then(|s| s.title.as_deref());
    if current == Some(title) {
        println!("Renamed session {id} → {title}");
        Ok(())
    } else {
        anyhow::bail!("Rename of '{id}' was not acknowledged by the store")
    }
}

pub async fn delete(manager: &mut SessionLifecycleManager, id: &str) -> Result<()> {
    if !manager.catalog().iter().any(|s| s.id == id) {
        anyhow::bail!("Session '{id}' not found");
    }
    manager.delete(id).await;
    println!("Deleted session {id}");
    Ok(())
}
