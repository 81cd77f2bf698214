//! Vessel position streamer
//!
//! Subscribes to the aisstream.io WebSocket feed, keeps the first position
//! report of each tracked vessel and stores it in PostgreSQL.

pub mod config;
pub mod dedup;
pub mod errors;
pub mod feed;
pub mod filter;
pub mod health;
pub mod models;
pub mod pipeline;
pub mod snapshot;
pub mod storage;
pub mod supervisor;
