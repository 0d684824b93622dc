//! Session listing and inspection handlers.

use anyhow::Result;
use galgo_core::catalog;
use galgo_core::lifecycle::SessionLifecycleManager;

pub fn list(manager: &SessionLifecycleManager, search: Option<&str>) -> Result<()> {
    let summaries = match search {
        Some(term) => catalog::filter(manager.catalog(), term),
        None => manager.catalog().to_vec(),
    };
    if summaries.is_empty() {
        println!("No sessions found.");
    } else {
        for summary in &summaries {
            let created_str = summary
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("{}  {}  {}", summary.display_title(), summary.id, created_str);
        }
    }
    Ok(())
}

pub fn show(manager: &mut SessionLifecycleManager, id: &str) -> Result<()> {
    if !manager.catalog().iter().any(|s| s.id == id) {
        anyhow::bail!("Session '{id}' not found");
    }
    manager.select(id);
    for message in manager.messages() {
        println!(
            "[{}] {}: {}",
            message.timestamp,
            message.sender.as_str(),
            message.text
        );
    }
    Ok(())
}
