// Submodules
pub mod local;
pub mod routes;
pub mod runtime;
mod state;

// Public API
pub use local::{local_ip, share_url};
pub use routes::create_router;
pub use runtime::{start, RunningServer};
pub use state::{ReadyGate, ServeInner, ServeState};
