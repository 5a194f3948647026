//! Editor Bridge Demo
//!
//! Attaches every bridge to an in-memory editor engine, edits a small
//! project, lets autosave persist it, then reopens the project in a fresh
//! engine from the same store.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | EDITOR_BRIDGE_STORE | memory | memory or localfs |
//! | EDITOR_BRIDGE_DATA_DIR | ./data | LocalFs root |
//! | EDITOR_BRIDGE_DB_NAME | web-editor | Database directory |
//! | EDITOR_BRIDGE_STORE_NAME | web-projects | Object store directory |
//! | EDITOR_BRIDGE_DOCUMENT_ID | project | Record key of the project |
//! | EDITOR_BRIDGE_AUTOSAVE | true | Autosave on mutation |
//! | EDITOR_BRIDGE_AUTOSAVE_DELAY_MS | 500 | Debounce quiet period |
//! | EDITOR_BRIDGE_AUTOSAVE_MAX_WAIT_MS | - | Cap on a sustained burst |
//! | EDITOR_BRIDGE_AUTOLOAD | true | Load the project on init |
//! | EDITOR_BRIDGE_LOG_FORMAT | pretty | pretty or json |
//! | EDITOR_BRIDGE_STYLESHEET_URL | - | Derived stylesheet endpoint |
//! | RUST_LOG | info | Log filter |

use editor_bridge::engine::{ComponentNode, EngineConfig, StorageManagerConfig};
use editor_bridge::observability::init_tracing;
use editor_bridge::page_settings::PageSettings;
use editor_bridge::stylesheet::collect_used_classes;
use editor_bridge::{
    kv, use_code_editor, use_kv_storage, use_modal, use_pages, BridgeConfig, CodeKind, DraftStore,
    Editor, EngineHandle, KvStore, MemoryEditor, Resource,
};
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = BridgeConfig::from_env();
    init_tracing(config.log_format);
    info!(backend = ?config.storage.backend, document = %config.storage.document_id, "starting editor bridge demo");

    let store = kv::open_store(&config.storage);
    let settle = config.autosave.delay + Duration::from_millis(100);

    // First session: edit and autosave
    let handle = EngineHandle::with_config(engine_config(&config));
    let storage = use_kv_storage(&handle, store.clone(), &config.autosave)?;
    let pages = use_pages(&handle)?;
    let modal = use_modal(&handle)?;
    let code = use_code_editor(&handle)?;

    let engine = MemoryEditor::from_config(&handle.config());
    let editor: Arc<dyn Editor> = engine.clone();
    handle.initialize(move |_| editor)?;
    tokio::time::sleep(settle).await;

    let about = pages.add(
        json!({"id": "about", "name": "About", "slug": "about"})
            .as_object()
            .cloned()
            .unwrap_or_default(),
    )?;
    pages.select(&about.id())?;
    let mut settings = PageSettings::read(&Resource::from(about.clone()));
    settings.tdk_title = "About us".into();
    settings.tdk_description = "Who builds this".into();
    settings.apply_to_model(about.as_ref());

    engine.set_page_content(
        "about",
        ComponentNode::element("main")
            .with_class("mx-auto")
            .with_child(ComponentNode::element("h1").with_class("text-3xl").with_content("About")),
    )?;
    code.update_code(CodeKind::Css, "main { padding: 2rem; }")?;
    engine.add_asset("https://cdn.example.com/logo.svg");
    info!(pending = storage.is_write_pending(), "edits applied");

    tokio::time::sleep(settle).await;
    let status = storage.status();
    info!(
        loads = status.loads,
        stores = status.stores,
        failures = status.failures,
        "autosave settled"
    );
    info!(
        pages = ?pages.pages().ids(),
        selected = ?pages.selected().id(),
        modal_open = modal.is_open(),
        html = %code.code(CodeKind::Html),
        "bridge state"
    );

    let classes = collect_used_classes(engine.as_ref());
    info!(?classes, "classes in use");
    build_stylesheet(&config, &classes).await;

    let drafts = DraftStore::from_config(&config);
    drafts
        .save_draft(&config.storage.document_id, &Value::Object(engine.project_data()))
        .await?;

    let torn_down = handle.shutdown();
    info!(bridges = torn_down, "first session closed");

    // Second session: reopen from the same store
    reopen(&config, store, settle).await?;
    Ok(())
}

fn engine_config(config: &BridgeConfig) -> EngineConfig {
    EngineConfig {
        storage_manager: Some(StorageManagerConfig {
            kind: String::new(),
            id: config.storage.document_id.clone(),
            autosave: config.autosave.enabled,
            autoload: config.autosave.autoload,
            steps_before_save: config.autosave.steps_before_save,
        }),
        ..Default::default()
    }
}

async fn reopen(
    config: &BridgeConfig,
    store: Arc<dyn KvStore>,
    settle: Duration,
) -> Result<(), Box<dyn Error>> {
    let handle = EngineHandle::with_config(engine_config(config));
    use_kv_storage(&handle, store, &config.autosave)?;
    let pages = use_pages(&handle)?;
    handle.initialize(MemoryEditor::build)?;
    tokio::time::sleep(settle).await;

    let restored = pages.pages();
    info!(pages = ?restored.ids(), "project reopened");
    if let Some(about) = restored.find("about") {
        let settings = PageSettings::from_projection(about);
        info!(name = %settings.name, title = %settings.tdk_title, "restored page settings");
    }
    handle.shutdown();
    Ok(())
}

#[cfg(feature = "stylesheet")]
async fn build_stylesheet(config: &BridgeConfig, classes: &[String]) {
    use editor_bridge::stylesheet::StylesheetClient;

    let Some(client) = StylesheetClient::from_config(config) else {
        return;
    };
    match client.build_css(classes).await {
        Ok(css) => info!(bytes = css.len(), "utility stylesheet built"),
        Err(err) => warn!(error = %err, "utility stylesheet unavailable"),
    }
}

#[cfg(not(feature = "stylesheet"))]
async fn build_stylesheet(config: &BridgeConfig, _classes: &[String]) {
    if config.stylesheet_endpoint.is_some() {
        warn!("stylesheet endpoint configured but the stylesheet feature is disabled");
    }
}
