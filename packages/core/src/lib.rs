// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod coordinator;
pub mod diff;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod services;
pub mod sources;
pub mod store;
pub mod translate;
pub mod types;

// Binary-facing modules. Declared pub so integration tests can build a
// pipeline from a resolved config.
pub mod cli;
pub mod config;
pub mod logging;

#[cfg(test)]
mod testing;
