//! Library crate for flag-duel-back: a two-player memory-matching session engine
//! exposed over REST, WebSocket and SSE.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
