//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Start dispatcher → Bind acceptor → Run event loop
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C received → Trigger → Wake event loop → Stop accepting
//!     → Drain or cancel tasks → Close channels → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: workers still busy after the deadline are abandoned

pub mod shutdown;

pub use shutdown::Shutdown;
