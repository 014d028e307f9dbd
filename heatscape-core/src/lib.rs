//! Core computation for the heatscape engine
//!
//! Everything in this crate is synchronous and deterministic:
//!
//! - [`regression`]: ordinary least-squares fits over pairs of table variables
//! - [`historical`]: the immutable historical reference table
//! - [`scenario`]: the user-steered CO₂ emission-rate scenario
//! - [`projection`]: year-by-year temperature and CO₂ projections
//! - [`state`]: the projection state and the controller that owns it
//! - [`geo`]: geographic helpers shared with the visualization components

pub mod errors;
pub mod geo;
pub mod historical;
pub mod projection;
pub mod regression;
pub mod scenario;
pub mod state;

/// Floating point type used throughout the engine
pub type FloatValue = f64;
/// Calendar year
pub type Year = i32;
