//! Shared wiring — build a [`ChatService`] and its collaborators from the
//! loaded configuration.

use std::sync::Arc;

use kotoba_chat::{
    ChatService, MemoryInjector, ModelBackedAnalyzer, PersonaInjector, ProjectAwarenessInjector,
    ReplyPostProcessor, SrsStatusInjector,
};
use kotoba_config::AppConfig;
use kotoba_core::knowledge::{ReferencedUnit, UnitKind};
use kotoba_core::memory::MemoryService;
use kotoba_core::model::ModelClient;
use kotoba_core::store::SessionStore;
use kotoba_providers::{HttpMemoryService, NoopMemoryService, OpenAiCompatClient};
use kotoba_store::{InMemoryKnowledge, InMemoryLearning, InMemoryStore, SqliteStore};

/// A starter curriculum so reference detection has something to resolve
/// against in a standalone install. The full product replaces this with its
/// curriculum database.
fn starter_curriculum() -> Vec<ReferencedUnit> {
    fn unit(id: &str, slug: &str, display: &str, kind: UnitKind) -> ReferencedUnit {
        ReferencedUnit {
            id: id.into(),
            slug: slug.into(),
            display: display.into(),
            kind,
        }
    }

    vec![
        unit("kanji_shoku", "shoku", "食", UnitKind::Kanji),
        unit("kanji_mizu", "mizu", "水", UnitKind::Kanji),
        unit("kanji_hi", "hi", "日", UnitKind::Kanji),
        unit("kanji_hito", "hito", "人", UnitKind::Kanji),
        unit("vocab_taberu", "taberu", "食べる", UnitKind::Vocabulary),
        unit("vocab_nomu", "nomu", "飲む", UnitKind::Vocabulary),
        unit("vocab_konnichiwa", "konnichiwa", "こんにちは", UnitKind::Vocabulary),
        unit("grammar_temiru", "te-miru", "～てみる", UnitKind::Grammar),
        unit("grammar_tai", "tai", "～たい", UnitKind::Grammar),
    ]
}

pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>, Box<dyn std::error::Error>> {
    match config.store.backend.as_str() {
        "in_memory" => Ok(Arc::new(InMemoryStore::new())),
        _ => {
            let path = config.store_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteStore::new(&path.to_string_lossy()).await?;
            Ok(Arc::new(store))
        }
    }
}

pub fn build_model(config: &AppConfig) -> Result<Arc<dyn ModelClient>, Box<dyn std::error::Error>> {
    let api_key = config
        .api_key
        .clone()
        .ok_or("No API key configured. Run `kotoba onboard` or set KOTOBA_API_KEY.")?;
    let client = OpenAiCompatClient::new("openai", &config.api_url, api_key)?;
    Ok(Arc::new(client))
}

fn build_memory(config: &AppConfig) -> Result<Arc<dyn MemoryService>, Box<dyn std::error::Error>> {
    if !config.memory.enabled {
        return Ok(Arc::new(NoopMemoryService));
    }
    let url = config
        .memory
        .url
        .as_deref()
        .ok_or("memory.enabled is set but memory.url is missing")?;
    Ok(Arc::new(HttpMemoryService::new(
        url,
        config.memory.api_key.clone(),
    )?))
}

/// Assemble the full send pipeline from config.
pub async fn build_service(config: &AppConfig) -> Result<ChatService, Box<dyn std::error::Error>> {
    let store = build_store(config).await?;
    let model = build_model(config)?;
    let memory = build_memory(config)?;
    let knowledge = Arc::new(InMemoryKnowledge::new(starter_curriculum()));
    let learning = Arc::new(InMemoryLearning::empty());

    let persona = match &config.chat.persona_override {
        Some(block) => PersonaInjector::new(block.clone()),
        None => PersonaInjector::default(),
    };

    let analyzer = ModelBackedAnalyzer::new(Arc::clone(&model), &config.default_model);

    let service = ChatService::new(
        store,
        Arc::clone(&model),
        ReplyPostProcessor::new(knowledge),
        &config.default_model,
    )
    .with_temperature(config.default_temperature)
    .with_max_tokens(config.default_max_tokens)
    .with_history_window(config.chat.history_window)
    .with_analyzer(Arc::new(analyzer))
    .with_injector(Arc::new(MemoryInjector::new(
        memory,
        config.chat.memory_limit,
    )))
    .with_injector(Arc::new(SrsStatusInjector::new(
        learning,
        SrsStatusInjector::default_rule(),
        3,
    )))
    .with_injector(Arc::new(persona))
    .with_injector(Arc::new(ProjectAwarenessInjector::default()));

    Ok(service)
}
