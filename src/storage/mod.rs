// Storage layer for generated artifacts and user settings

pub mod artifacts;
pub mod settings;

pub use artifacts::ArtifactStore;
pub use settings::SettingsStore;
