pub mod channel;
pub mod commands;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod npy;
pub mod payload;
pub mod shape;
pub mod state;
