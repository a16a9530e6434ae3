//! Persistent user settings.
//!
//! Settings are loaded once when a [`Preferences`] is constructed and written
//! back through its [`SettingsStore`] every time a change is made.

use std::sync::{Mutex, PoisonError};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// Names handed to users who never chose one.
const DEFAULT_NAMES: &[&str] = &[
    "Agnes Holloway",
    "Bram Okafor",
    "Celia Marsh",
    "Dario Lindqvist",
    "Esther Quan",
    "Felix Amadi",
    "Greta Solberg",
    "Hugo Paredes",
    "Ines Whitlock",
    "Jonah Ferreira",
    "Kira Castellano",
    "Leon Abernathy",
    "Mira Szabo",
    "Nico Hartmann",
    "Odile Brennan",
    "Pavel Ikeda",
    "Rosa Delacroix",
    "Silas Mbeki",
    "Tamsin Reyes",
    "Umar Kowalski",
];

/// User settings shared by every game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    /// Display name; also identifies the local player in a roster.
    #[serde(default)]
    pub user_name: String,

    /// Whether this device leads the next game.
    #[serde(default)]
    pub lead_player: bool,

    /// Player count the leader declares.
    #[serde(default)]
    pub num_players: usize,

    /// Use the proximity transport instead of the relay.
    #[serde(default, rename = "NearbyOnly")]
    pub proximity_only: bool,

    /// Current group token.
    #[serde(default, rename = "GameToken")]
    pub group_token: Option<String>,

    /// Group tokens used before, most recent first.
    #[serde(default)]
    pub saved_tokens: Vec<String>,

    /// Relay endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_endpoint: Option<String>,
}

impl Settings {
    /// Make `token` the current group token and move it to the front of the
    /// saved list.
    pub fn use_group_token(&mut self, token: impl Into<String>) {
        let token = token.into();
        self.saved_tokens.retain(|t| t != &token);
        self.saved_tokens.insert(0, token.clone());
        self.group_token = Some(token);
    }

    /// Forget a saved group token. The current token is cleared if it matches.
    pub fn forget_group_token(&mut self, token: &str) {
        self.saved_tokens.retain(|t| t != token);
        if self.group_token.as_deref() == Some(token) {
            self.group_token = None;
        }
    }
}

/// Persistence port for [`Settings`].
pub trait SettingsStore: Send {
    /// Load stored settings, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<Settings>, ConfigError>;

    /// Replace the stored settings.
    fn save(&self, settings: &Settings) -> Result<(), ConfigError>;
}

/// Settings kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Settings>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `settings`.
    pub fn with(settings: Settings) -> Self {
        Self {
            saved: Mutex::new(Some(settings)),
        }
    }

    /// The last saved settings.
    pub fn saved(&self) -> Option<Settings> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Option<Settings>, ConfigError> {
        Ok(self.saved())
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(settings.clone());
        Ok(())
    }
}

/// Settings kept in a JSON file.
#[cfg(feature = "persistence")]
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: std::path::PathBuf,
}

#[cfg(feature = "persistence")]
impl JsonFileStore {
    /// Store settings at `path`. Parent directories are created on save.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(feature = "persistence")]
impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Option<Settings>, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Settings with load-at-construction, save-on-change semantics.
pub struct Preferences {
    store: Box<dyn SettingsStore>,
    current: Settings,
}

impl Preferences {
    /// Load settings from `store`.
    ///
    /// A user without a name is given a random one, which is saved right
    /// away.
    pub fn load(store: impl SettingsStore + 'static) -> Result<Self, ConfigError> {
        let mut current = store.load()?.unwrap_or_default();
        if current.user_name.trim().is_empty() {
            current.user_name = random_name();
            tracing::info!(user_name = %current.user_name, "assigned default user name");
            store.save(&current)?;
        }
        Ok(Self {
            store: Box::new(store),
            current,
        })
    }

    /// Current settings.
    pub fn get(&self) -> &Settings {
        &self.current
    }

    /// Change settings. They are saved only if something actually changed.
    pub fn update(&mut self, change: impl FnOnce(&mut Settings)) -> Result<(), ConfigError> {
        let mut next = self.current.clone();
        change(&mut next);
        if next.user_name.trim().is_empty() {
            return Err(ConfigError::Invalid("user name may not be empty".into()));
        }
        if next.user_name.contains(crate::core::PLAYER_LIST_SEPARATOR) {
            return Err(ConfigError::Invalid("user name may not span lines".into()));
        }
        if next == self.current {
            return Ok(());
        }
        self.store.save(&next)?;
        self.current = next;
        Ok(())
    }
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

fn random_name() -> String {
    DEFAULT_NAMES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Player")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// Shares a memory store with the test after it is boxed.
    struct Shared(Arc<MemoryStore>);

    impl SettingsStore for Shared {
        fn load(&self) -> Result<Option<Settings>, ConfigError> {
            self.0.load()
        }

        fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
            self.0.save(settings)
        }
    }

    #[test]
    fn test_missing_name_assigned_and_saved() {
        let store = Arc::new(MemoryStore::new());
        let prefs = Preferences::load(Shared(Arc::clone(&store))).unwrap();
        let name = prefs.get().user_name.clone();
        assert!(DEFAULT_NAMES.contains(&name.as_str()));
        assert_eq!(store.saved().unwrap().user_name, name);
    }

    #[test]
    fn test_existing_settings_loaded() {
        let settings = Settings {
            user_name: "Ada".into(),
            lead_player: true,
            num_players: 3,
            ..Settings::default()
        };
        let prefs = Preferences::load(MemoryStore::with(settings.clone())).unwrap();
        assert_eq!(prefs.get(), &settings);
    }

    #[test]
    fn test_update_saves_on_change() {
        let store = Arc::new(MemoryStore::with(Settings {
            user_name: "Ada".into(),
            ..Settings::default()
        }));
        let mut prefs = Preferences::load(Shared(Arc::clone(&store))).unwrap();

        prefs.update(|s| s.num_players = 4).unwrap();
        assert_eq!(store.saved().unwrap().num_players, 4);

        assert!(prefs.update(|s| s.user_name = "  ".into()).is_err());
        assert_eq!(prefs.get().user_name, "Ada");
    }

    #[test]
    fn test_group_tokens() {
        let mut settings = Settings::default();
        settings.use_group_token("alpha");
        settings.use_group_token("beta");
        settings.use_group_token("alpha");
        assert_eq!(settings.saved_tokens, vec!["alpha", "beta"]);
        assert_eq!(settings.group_token.as_deref(), Some("alpha"));

        settings.forget_group_token("alpha");
        assert_eq!(settings.saved_tokens, vec!["beta"]);
        assert_eq!(settings.group_token, None);
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_json_keys() {
        let settings = Settings {
            user_name: "Ada".into(),
            proximity_only: true,
            group_token: Some("grp".into()),
            ..Settings::default()
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["UserName"], "Ada");
        assert_eq!(json["NearbyOnly"], true);
        assert_eq!(json["GameToken"], "grp");
        assert!(json.get("RelayEndpoint").is_none());
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_json_file_store() {
        let path = std::env::temp_dir().join(format!(
            "unigame-settings-{}-{}.json",
            std::process::id(),
            rand::random::<u32>()
        ));
        let store = JsonFileStore::new(&path);
        assert_eq!(store.load().unwrap(), None);

        let settings = Settings {
            user_name: "Ada".into(),
            saved_tokens: vec!["grp".into()],
            ..Settings::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), Some(settings));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(store.load(), Err(ConfigError::Json(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
