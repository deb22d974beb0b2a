pub mod auth_store;
pub mod loopback;
pub mod supervisor;
pub mod version;

pub use auth_store::FileAuthStore;
pub use loopback::LoopbackEngine;
pub use supervisor::{ConnectionSupervisor, ReconnectPolicy, SupervisorConfig};
pub use version::{FallbackResolver, HttpVersionFetcher, PinnedResolver, VersionCache, VersionFetcher};
