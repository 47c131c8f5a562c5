//! Offline-first request cache for the ShakeGuard earthquake-preparedness site.

pub mod cache;
pub mod config;
pub mod logging;
pub mod net;
