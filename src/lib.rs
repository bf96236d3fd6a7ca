// Configuration (TOML + env overrides)
pub mod config;

// Admission filter and counter stores
pub mod rate_limit;

// Submission payloads and validation
pub mod submission;

// Lead persistence
pub mod store;

// HTTP API
pub mod api;
