//! Core components, types, and utilities for the everyone-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Fixed replies sent back to chats.
//! - Common types and result handling.

pub mod config;
pub mod replies;
pub mod types;
