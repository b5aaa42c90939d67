//! Academic materials sharing: a REST service for study materials with
//! favorites and comments, plus the client-side pieces (API client, session
//! store, offline cache and connectivity monitor) that consume it.

pub mod api;
pub mod client;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod storage;
