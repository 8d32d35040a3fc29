//! Configuration, mount guards and the ambient context tree

pub mod config;
pub mod context;
pub mod guard;
pub mod theme;

pub use config::{EntityConfig, EntityConfigBuilder, IdentityChangePolicy, LifecycleOptions};
pub use context::{AmbientContext, ParentOverride, Provision, Scope, Subscription};
pub use guard::MountGuard;
pub use theme::{Theme, ThemeProvider};
