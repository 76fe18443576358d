pub mod settings;

pub use settings::{
    load_settings, save_settings, AvatarSettings, CatalogSettings, CompositionSettings, LoaderSettings,
    LoggingSettings, SettingsError, ViewerSettings,
};
