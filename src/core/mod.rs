pub mod client;
pub mod config;
pub mod config_flow;
pub mod coordinator;
pub mod formatter;
pub mod integration;
pub mod models;
pub mod sensor;
pub mod srp;
