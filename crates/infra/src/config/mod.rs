//! Configuration loading

pub mod loader;

pub use loader::{
    apply_overrides, load, load_from_env, load_from_file, parse_config, probe_config_paths,
};
