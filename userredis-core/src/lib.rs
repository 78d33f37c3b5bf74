//! userredis core library: domain types, settings, package store, config generation.
//!
//! Public API surface:
//! - [`types`]: newtypes ([`Username`], [`PackageName`]) and [`InstanceInfo`]
//! - [`error`]: [`CoreError`]
//! - [`settings`]: YAML settings with defaults
//! - [`layout`]: per-user instance paths
//! - [`packages`]: the packages directory (list / load / save / delete / lock)
//! - [`render`]: tera rendering of `redis.conf`
//! - [`generator`]: writes a user's config and applies the ownership policy

pub mod error;
pub mod generator;
pub mod layout;
pub mod packages;
pub mod render;
pub mod settings;
pub mod types;
mod write;

pub use error::CoreError;
pub use generator::{ConfigGenerator, GeneratedConfig, Ownership};
pub use layout::InstanceLayout;
pub use packages::{PackageLock, PackageStore, ResolvedPackage};
pub use render::ConfigRenderer;
pub use settings::Settings;
pub use types::{InstanceInfo, PackageName, Username, DEFAULT_PACKAGE};
