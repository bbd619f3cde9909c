//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Listener and admission configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Turn-taking configuration
    #[serde(default)]
    pub turn: TurnConfig,

    /// Speech collaborator endpoints
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Session store and call log configuration
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Logging and metrics configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Path to the tenant directory file
    #[serde(default = "default_tenants_path")]
    pub tenants_path: String,
}

fn default_tenants_path() -> String {
    "config/tenants.yaml".to_string()
}

/// One audio listener binding. The dialed extension is a property of the
/// binding: the telephony gateway reaches a tenant by connecting to its
/// extension's address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerBinding {
    pub addr: String,
    pub extension: String,
}

/// Listener and admission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Audio listener bindings
    #[serde(default = "default_bindings")]
    pub bindings: Vec<ListenerBinding>,

    /// Address of the health/metrics HTTP surface
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Admission ceiling: concurrent active calls
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// A connection must present its handshake within this window
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Sessions idle longer than this are torn down
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Sweep interval for the idle-session cleanup task
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_bindings() -> Vec<ListenerBinding> {
    vec![ListenerBinding {
        addr: "0.0.0.0:9092".to_string(),
        extension: "100".to_string(),
    }]
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_sessions() -> usize {
    64
}

fn default_handshake_timeout_ms() -> u64 {
    3000
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_cleanup_interval_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bindings: default_bindings(),
            http_addr: default_http_addr(),
            max_sessions: default_max_sessions(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

/// What to do when the caller stays silent through the reprompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SilenceEscalation {
    /// Hand the call to a human operator
    #[default]
    Transfer,
    /// Say goodbye and hang up
    HangUp,
}

/// Turn-taking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// No transcript activity for this long while listening triggers the
    /// reprompt; a second consecutive timeout escalates.
    #[serde(default = "default_silence_timeout_ms")]
    pub silence_timeout_ms: u64,

    #[serde(default)]
    pub silence_escalation: SilenceEscalation,

    /// Caller audio above this energy during playback counts as barge-in
    #[serde(default = "default_barge_in_energy_db")]
    pub barge_in_energy_db: f32,

    /// Upper bound on tool rounds within one thinking phase
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Outbound queue capacity, in frames
    #[serde(default = "default_outbound_queue_frames")]
    pub outbound_queue_frames: usize,

    /// Scripted lines, spoken verbatim when needed
    #[serde(default = "default_reprompt_text")]
    pub reprompt_text: String,
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,
    #[serde(default = "default_transfer_text")]
    pub transfer_text: String,
    #[serde(default = "default_apology_text")]
    pub apology_text: String,
    #[serde(default = "default_goodbye_text")]
    pub goodbye_text: String,
}

fn default_silence_timeout_ms() -> u64 {
    10_000
}

fn default_barge_in_energy_db() -> f32 {
    -35.0
}

fn default_max_tool_rounds() -> usize {
    4
}

fn default_outbound_queue_frames() -> usize {
    // 2 seconds of playback headroom
    100
}

fn default_reprompt_text() -> String {
    "Ви ще на лінії? Чим я можу допомогти?".to_string()
}

fn default_fallback_text() -> String {
    "Вибачте, я не розчула. Повторіть, будь ласка, ще раз.".to_string()
}

fn default_transfer_text() -> String {
    "Хвилинку, з'єдную вас з оператором.".to_string()
}

fn default_apology_text() -> String {
    "Перепрошую, сталася технічна помилка. Будь ласка, зателефонуйте пізніше.".to_string()
}

fn default_goodbye_text() -> String {
    "Дякую за дзвінок! Гарного дня.".to_string()
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: default_silence_timeout_ms(),
            silence_escalation: SilenceEscalation::default(),
            barge_in_energy_db: default_barge_in_energy_db(),
            max_tool_rounds: default_max_tool_rounds(),
            outbound_queue_frames: default_outbound_queue_frames(),
            reprompt_text: default_reprompt_text(),
            fallback_text: default_fallback_text(),
            transfer_text: default_transfer_text(),
            apology_text: default_apology_text(),
            goodbye_text: default_goodbye_text(),
        }
    }
}

/// Speech collaborator endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_stt_endpoint")]
    pub stt_endpoint: String,

    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_tts_endpoint")]
    pub tts_endpoint: String,

    /// Per-request timeout toward any speech collaborator
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Phrase-cache capacity for synthesized audio
    #[serde(default = "default_tts_cache_entries")]
    pub tts_cache_entries: usize,
}

fn default_stt_endpoint() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:8002".to_string()
}

fn default_llm_model() -> String {
    "call-agent-chat".to_string()
}

fn default_tts_endpoint() -> String {
    "http://127.0.0.1:8003".to_string()
}

fn default_request_timeout_ms() -> u64 {
    8000
}

fn default_tts_cache_entries() -> usize {
    256
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_endpoint: default_stt_endpoint(),
            llm_endpoint: default_llm_endpoint(),
            llm_model: default_llm_model(),
            tts_endpoint: default_tts_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            tts_cache_entries: default_tts_cache_entries(),
        }
    }
}

/// Session store and call log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// TTL applied on every session-store upsert
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Call logger channel capacity
    #[serde(default = "default_log_buffer")]
    pub log_buffer: usize,

    /// Backoff between flush retries after a sink failure
    #[serde(default = "default_log_retry_ms")]
    pub log_retry_ms: u64,
}

fn default_session_ttl_secs() -> u64 {
    900
}

fn default_log_buffer() -> usize {
    1024
}

fn default_log_retry_ms() -> u64 {
    500
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            log_buffer: default_log_buffer(),
            log_retry_ms: default_log_retry_ms(),
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Emit JSON log lines instead of the human format
    #[serde(default)]
    pub log_json: bool,

    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info,call_agent=debug".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_json: false,
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "admission ceiling must be at least 1".to_string(),
            });
        }
        if self.server.bindings.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.bindings".to_string(),
                message: "at least one listener binding is required".to_string(),
            });
        }
        if self.turn.silence_timeout_ms < 1000 {
            return Err(ConfigError::InvalidValue {
                field: "turn.silence_timeout_ms".to_string(),
                message: "silence timeout below 1s would reprompt mid-utterance".to_string(),
            });
        }
        if self.turn.outbound_queue_frames == 0 {
            return Err(ConfigError::InvalidValue {
                field: "turn.outbound_queue_frames".to_string(),
                message: "outbound queue needs capacity for at least one frame".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from files and environment.
///
/// Priority: env vars > `config/{env}.yaml` > `config/default.yaml` >
/// built-in defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
