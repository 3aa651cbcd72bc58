//! Duo Signal - real-time chat delivery and call signaling for matched pairs.
//!
//! Clients hold one WebSocket per device. Chat messages fan out to every
//! device of every room member in submission order; calls go through an
//! invitation handshake and are limited by a monthly per-pair quota.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
