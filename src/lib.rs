// Injectable time source
pub mod clock;

// Configuration loading, presets and validation
pub mod config;

// Compiled, validated simulation model
pub mod model;

// Bounded random walk for numeric readings
pub mod walk;

// Threshold classification of readings into severity levels
pub mod classify;

// Entities, readings and the per-tick state engine
pub mod state;

// Aggregates, standing and transient alerts
pub mod alert;

// Immutable per-tick snapshot handed to renderers
pub mod snapshot;

// Fixed-period tick driver
pub mod scheduler;

// WebSocket snapshot streaming
pub mod subscription;

// HTTP and WebSocket surface for renderers
pub mod api;
