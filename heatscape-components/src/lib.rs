//! Runtime components of the heatscape engine
//!
//! This crate turns sparse per-city weather samples into an animated heat field with one
//! interactive overlay per city, and keeps narrative text in step with the projection
//! state.
//!
//! # Module Organisation
//!
//! - `collaborators`: async traits for the weather, narrative and region services
//! - `city_store`: latest weather batch and its periodic refresh
//! - `jitter`: expansion of city samples into synthetic density clouds
//! - `heat_field`: gradient selection and the pulsing radius animation
//! - `overlay`: per-city labels, hover and click snapshots
//! - `narrative`: debounced narrative requests
//! - `regions`: optional region choropleth
//! - `config`: engine configuration loaded from TOML
//! - `session`: wiring of all of the above, including teardown

pub mod city_store;
pub mod collaborators;
pub mod config;
pub mod heat_field;
pub mod jitter;
pub mod narrative;
pub mod overlay;
pub mod regions;
pub mod session;
