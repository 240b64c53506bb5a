//! Telegram bot that finds music videos and replies with their audio.

/// Telegram side: events, routing, sending
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Search, extraction and per-chat workspaces
pub mod media;
/// Process wiring: transport handshake, polling, shutdown
pub mod runner;
