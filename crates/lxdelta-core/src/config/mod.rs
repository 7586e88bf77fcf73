mod defaults;
mod deserialize;
mod hooks;
mod resolve;
mod types;

pub use self::defaults::parse_human_duration;
pub use self::hooks::HooksConfig;
pub use self::resolve::{
    default_config_search_paths, load_config, load_or_default, minimal_config_template,
    resolve_config_path, ConfigSource, CONFIG_ENV_VAR,
};
pub use self::types::*;
