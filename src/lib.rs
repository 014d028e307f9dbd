//! Climate projection and heat-field visualization engine
//!
//! - [`heatscape_core`]: historical data, regressions, emission scenarios and projections
//! - [`heatscape_components`]: city sampling, heat field, overlays, narrative and session
//!   wiring
//!
//! Python bindings are built with the `python` feature.

pub use heatscape_components;
pub use heatscape_core;

#[cfg(feature = "python")]
mod python;
