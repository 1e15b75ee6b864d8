mod load;
mod types;

pub use load::{get_spector_data_dir, load_default};
pub use types::{
    AppConfig, BackendConfig, BackendKind, HttpServerConfig, LoggingConfig, ModelConfig,
    OrchestratorConfig, SchedulerConfig,
};
