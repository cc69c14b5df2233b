pub mod config;
pub mod player;
pub mod policy;
pub mod routes;
pub mod state;
pub mod telemetry;
