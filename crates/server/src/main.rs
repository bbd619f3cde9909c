//! Call-agent server entry point

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use call_agent_agent::ControllerDeps;
use call_agent_config::{load_settings, Settings, StaticTenantDirectory};
use call_agent_core::{SessionStore, TenantConfig, TenantDirectory};
use call_agent_persistence::{AsyncCallLogger, InMemorySessionStore, MemoryCallLogSink};
use call_agent_pipeline::{
    HttpLlm, HttpLlmConfig, HttpStt, HttpSttConfig, HttpTts, HttpTtsConfig, SpeechBridge,
    SttTuning,
};
use call_agent_server::{create_router, init_metrics, run_listener, AppState, SessionManager};
use call_agent_tools::{create_retail_registry, StubRetailBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("CALL_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not up yet
            eprintln!("warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?settings.environment,
        "starting call-agent server"
    );

    let metrics_handle = init_metrics()?;
    tracing::info!("prometheus metrics at /metrics");

    // Tenant directory: file-backed with a built-in fallback so a dev box
    // answers calls without any config on disk.
    let directory: Arc<dyn TenantDirectory> =
        match StaticTenantDirectory::from_file(&settings.tenants_path) {
            Ok(directory) => {
                tracing::info!(
                    path = %settings.tenants_path,
                    extensions = directory.extension_count(),
                    "tenant directory loaded"
                );
                Arc::new(directory)
            }
            Err(e) => {
                tracing::warn!(path = %settings.tenants_path, error = %e, "tenant file missing, using built-in tenant");
                Arc::new(StaticTenantDirectory::from_tenants(
                    vec![dev_tenant()],
                    Some("kolesoplus"),
                ))
            }
        };

    // Speech collaborators
    let request_timeout = Duration::from_millis(settings.speech.request_timeout_ms);
    let stt = Arc::new(HttpStt::new(HttpSttConfig {
        endpoint: settings.speech.stt_endpoint.clone(),
        request_timeout,
        tuning: SttTuning::default(),
    })?);
    let llm = Arc::new(HttpLlm::new(HttpLlmConfig {
        endpoint: settings.speech.llm_endpoint.clone(),
        model: settings.speech.llm_model.clone(),
        request_timeout,
        temperature: 0.3,
    })?);
    let tts = Arc::new(HttpTts::new(HttpTtsConfig {
        endpoint: settings.speech.tts_endpoint.clone(),
        request_timeout,
    })?);
    let bridge = Arc::new(SpeechBridge::new(
        stt,
        llm,
        tts,
        settings.speech.tts_cache_entries,
    ));

    // Domain tools. The in-memory retail backend serves until the order
    // system integration is wired in deployment config.
    let tools = Arc::new(create_retail_registry(Arc::new(StubRetailBackend::new())));

    // Session store and call log sink. The clustered implementations are
    // deployed as sidecars of the admin plane; in-process stand-ins keep a
    // single-node install self-contained.
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let sink = Arc::new(MemoryCallLogSink::new());
    let (logger, _logger_handle) = AsyncCallLogger::spawn(
        sink,
        settings.persistence.log_buffer,
        Duration::from_millis(settings.persistence.log_retry_ms),
    );

    let sessions = SessionManager::new(
        settings.server.max_sessions,
        Duration::from_secs(settings.server.idle_timeout_secs),
    );
    let _sweeper = Arc::clone(&sessions).start_sweeper(Duration::from_secs(
        settings.server.cleanup_interval_secs,
    ));

    let settings = Arc::new(settings);
    let state = AppState::new(
        Arc::clone(&settings),
        directory,
        Arc::clone(&sessions),
        ControllerDeps {
            bridge,
            tools,
            logger,
            store,
        },
    );

    // One audio listener per binding
    for binding in settings.server.bindings.clone() {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_listener(binding.clone(), state).await {
                tracing::error!(addr = %binding.addr, error = %e, "audio listener failed");
            }
        });
    }

    // Observability surface
    let router = create_router(state, metrics_handle);
    let http_listener = tokio::net::TcpListener::bind(&settings.server.http_addr).await?;
    tracing::info!(addr = %settings.server.http_addr, "observability surface up");

    tokio::select! {
        result = axum::serve(http_listener, router) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.observability.log_filter.clone()));

    if settings.observability.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn dev_tenant() -> TenantConfig {
    TenantConfig {
        slug: "kolesoplus".into(),
        name: "КолесоПлюс".into(),
        extensions: vec!["100".into()],
        enabled_tools: Default::default(),
        greeting: "Вітаю! Ви зателефонували до мережі КолесоПлюс. Чим можу допомогти?".into(),
        prompt_suffix: String::new(),
        operator_extension: Some("0".into()),
        language: "uk".into(),
        default_scenario: None,
    }
}
