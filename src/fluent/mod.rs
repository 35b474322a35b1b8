//! FluentRouter and middleware configuration.
//!
//! - [`router`] - Core `FluentRouter` struct, collaborators, route registration
//! - [`request`] - The request pipeline and request ids
//! - [`control`] - The error boundary (panics and escalations)
//! - [`features`] - Security headers
//! - [`observability`] - The per-request trace span
//! - [`builder`] - Orchestration (setup_middleware, start, router delegation)
//! - [`shutdown`] - Shutdown phase notifications

mod builder;
mod control;
mod features;
mod observability;
mod request;
mod router;
mod shutdown;

pub use control::INTERNAL_ERROR_MESSAGE;
pub use router::FluentRouter;
pub use shutdown::{ShutdownNotifier, ShutdownPhase};

#[cfg(test)]
mod tests;
