//! `kotoba sessions` — List stored sessions for a user.

use kotoba_config::AppConfig;
use serde_json::json;

use super::runtime;

pub async fn run(user: String, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = runtime::build_store(&config).await?;

    let sessions = store.user_sessions(&user).await?;

    if json_output {
        let rows: Vec<_> = sessions
            .iter()
            .map(|s| {
                json!({
                    "id": s.id.0,
                    "title": s.title,
                    "summary": s.summary,
                    "messages": s.messages.len(),
                    "created_at": s.created_at.to_rfc3339(),
                    "updated_at": s.updated_at.to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("  No sessions for user '{user}'. Start one with `kotoba chat`.");
        return Ok(());
    }

    println!("  Sessions for '{user}' (most recent first):");
    println!();
    for s in &sessions {
        let title = s.title.as_deref().unwrap_or("(untitled)");
        println!("  {}  {}", s.id, title);
        println!(
            "      {} messages, updated {}",
            s.messages.len(),
            s.updated_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(summary) = &s.summary {
            println!("      {summary}");
        }
        println!();
    }

    Ok(())
}
