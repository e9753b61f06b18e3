// Configuration management module
// TOML settings in the base directory plus chat credentials from the environment

pub mod credentials;
pub mod interactive;
pub mod settings;


pub use credentials::ChatCredentials;
pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, IndexConfig, IngestConfig, MAX_TOP_K, OllamaConfig, QueryConfig,
    RewriteConfig, validate_min_score, validate_top_k,
};
