use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "spector_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Reasoning-model endpoint settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model_name")]
    pub model: String,

    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_model_temperature")]
    pub temperature: f32,

    /// Hard ceiling on a single decision request. The model call is a
    /// blocking call with a timeout, never fire-and-forget.
    #[serde(default = "default_model_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional API key; may also come from SPECTOR_MODEL_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_model_endpoint() -> String {
    "http://127.0.0.1:8080/v1/chat/completions".to_string()
}

fn default_model_name() -> String {
    "computer-use-preview".to_string()
}

fn default_model_max_tokens() -> u32 {
    4096
}

fn default_model_temperature() -> f32 {
    0.05
}

fn default_model_request_timeout_ms() -> u64 {
    120_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            model: default_model_name(),
            max_tokens: default_model_max_tokens(),
            temperature: default_model_temperature(),
            request_timeout_ms: default_model_request_timeout_ms(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Same-process automation against the host display.
    Local,
    /// Session proxied into an isolated per-slot display container.
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,

    /// Container name used by the docker backend; the slot index is appended
    /// when the pool holds more than one display.
    #[serde(default = "default_backend_container")]
    pub container: String,

    /// Wheel events are scaled down by this factor before being replayed.
    #[serde(default = "default_backend_scroll_scale")]
    pub scroll_scale: u32,
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Docker
}

fn default_backend_container() -> String {
    "agent".to_string()
}

fn default_backend_scroll_scale() -> u32 {
    100
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            container: default_backend_container(),
            scroll_scale: default_backend_scroll_scale(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard ceiling on trajectory length; exhaustion force-finalizes the run.
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,

    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,

    /// How many trailing steps are replayed into the per-step prompt.
    #[serde(default = "default_summary_window")]
    pub summary_window: usize,

    /// Observation summaries and rationales are clipped to this many chars
    /// before prompting.
    #[serde(default = "default_max_fragment_chars")]
    pub max_fragment_chars: usize,
}

fn default_step_budget() -> usize {
    30
}

fn default_capture_timeout_ms() -> u64 {
    15_000
}

fn default_action_timeout_ms() -> u64 {
    30_000
}

fn default_summary_window() -> usize {
    8
}

fn default_max_fragment_chars() -> usize {
    600
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
            capture_timeout_ms: default_capture_timeout_ms(),
            action_timeout_ms: default_action_timeout_ms(),
            summary_window: default_summary_window(),
            max_fragment_chars: default_max_fragment_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of isolated display slots; the hard concurrency ceiling.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// First X display number; slot i maps to display :(base + i).
    #[serde(default = "default_display_base")]
    pub display_base: u32,

    /// A run queued longer than this fails with AdmissionTimeout.
    #[serde(default = "default_admission_timeout_ms")]
    pub admission_timeout_ms: u64,
}

fn default_pool_size() -> usize {
    5
}

fn default_display_base() -> u32 {
    99
}

fn default_admission_timeout_ms() -> u64 {
    300_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            display_base: default_display_base(),
            admission_timeout_ms: default_admission_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8750
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert!(cfg.orchestrator.step_budget > 0);
        assert!(cfg.scheduler.pool_size > 0);
        assert_eq!(cfg.backend.kind, BackendKind::Docker);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [scheduler]
            pool_size = 2

            [orchestrator]
            step_budget = 12
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.pool_size, 2);
        assert_eq!(cfg.orchestrator.step_budget, 12);
        assert_eq!(cfg.scheduler.display_base, 99);
        assert_eq!(cfg.model.model, "computer-use-preview");
    }

    #[test]
    fn backend_kind_parses_lowercase() {
        let cfg: AppConfig = toml::from_str("[backend]\nkind = \"local\"\n").unwrap();
        assert_eq!(cfg.backend.kind, BackendKind::Local);
    }
}
