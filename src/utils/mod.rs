//! Utility modules: structured events and logger setup.
pub mod events;
pub mod logger;
