use directline::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Layering, lowest to highest:
//
//   struct defaults
//   directline.toml   [session]
//                     secret = "..."
//   env vars          DIRECTLINE_SESSION__SECRET=...   (double underscore = nesting)
//   CLI flags         applied by `ChatConfig::apply_overrides`

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "directline.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub session: SessionConfig,
    /// Sent once the stream is open.
    #[serde(default)]
    pub greeting: Option<String>,
}

/// Command-line values that win over every file/env layer.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub secret: Option<String>,
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub greeting: Option<String>,
    pub debug: bool,
    pub all_activities: bool,
}

impl ChatConfig {
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(secret) = overrides.secret {
            self.session.secret = secret;
        }
        if let Some(name) = overrides.name {
            self.session.display_name = name;
        }
        if let Some(endpoint) = overrides.endpoint {
            self.session.endpoint = endpoint;
        }
        if overrides.greeting.is_some() {
            self.greeting = overrides.greeting;
        }
        if overrides.debug {
            self.session.debug = true;
        }
        if overrides.all_activities {
            self.session.batch_dispatch = directline::BatchDispatch::All;
        }
    }
}

/// Build a figment that layers defaults → TOML file → `DIRECTLINE_*` env vars.
pub fn load_config(path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(ChatConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DIRECTLINE_").split("__"))
}
