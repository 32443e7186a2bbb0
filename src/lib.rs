/// Application configuration, parsed from the command line and environment.
pub mod config;

/// Route handlers, extractors and the server entry point.
pub mod http;

/// Database access: one controller per table, collected behind `StoreTrait`.
pub mod models;

/// Outbound clients for the third-party APIs the routes proxy to.
pub mod upstream;

/// Muscle-group catalog and workout plan building on top of ExerciseDB.
pub mod workout;
