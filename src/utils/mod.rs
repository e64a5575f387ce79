/// TOML configuration (`crew.toml`) with hot reloading.
pub mod toml_config;
