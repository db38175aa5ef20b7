//! Configuration loaded from `.sealbox.toml`.

pub mod settings;

pub use settings::Settings;
