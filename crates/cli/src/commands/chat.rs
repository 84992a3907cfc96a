//! `kotoba chat` — Interactive or single-message tutoring mode.

use std::io::Write;

use kotoba_config::AppConfig;
use kotoba_core::session::Action;

use super::runtime;

pub async fn run(
    session: Option<String>,
    user: String,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    KOTOBA_API_KEY = 'sk-...'   (generic)");
        eprintln!("    OPENAI_API_KEY = 'sk-...'   (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add api_key to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let service = runtime::build_service(&config).await?;

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = service.send_message(&user, session.as_deref(), &msg).await?;
        eprint!("\r              \r");
        println!("{}", outcome.reply.content);
        print_meta(&outcome.reply.meta);
        eprintln!();
        eprintln!("  session: {}", outcome.session_id);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Kotoba — Japanese Tutor");
    println!("  =======================");
    println!();
    println!("  Model:   {}", config.default_model);
    println!("  Store:   {}", config.store.backend);
    println!("  Memory:  {}", if config.memory.enabled { "enabled" } else { "disabled" });
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut current_session = session;
    let stdin = std::io::stdin();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        eprint!("  ...");
        match service
            .send_message(&user, current_session.as_deref(), line)
            .await
        {
            Ok(outcome) => {
                eprint!("\r     \r");
                println!();
                for reply_line in outcome.reply.content.lines() {
                    println!("  Tutor > {reply_line}");
                }
                print_meta(&outcome.reply.meta);
                println!();
                // Later messages continue the same thread
                current_session = Some(outcome.session_id.0);
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  またね! (See you!)");
    println!();

    Ok(())
}

fn print_meta(meta: &kotoba_core::session::MessageMeta) {
    for action in &meta.actions {
        match action {
            Action::GrammarReference { pattern } => {
                println!("  [grammar: {pattern}]");
            }
            Action::DrillSuggestion => {
                println!("  [drill available — try `kotoba chat -m \"quiz me\"`]");
            }
        }
    }
    if !meta.referenced_units.is_empty() {
        let names: Vec<&str> = meta
            .referenced_units
            .iter()
            .map(|u| u.display.as_str())
            .collect();
        println!("  [references: {}]", names.join(", "));
    }
}
