//! Application configuration loading.

/// Load configuration from `.env` and environment variables.
pub fn load_config() -> stupid_core::Config {
    stupid_core::config::load_dotenv();
    stupid_core::Config::from_env()
}
