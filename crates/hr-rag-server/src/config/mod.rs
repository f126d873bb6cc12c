pub mod settings;

pub use settings::{AppEnv, Settings};
