//! Student admission intake, administrative review, and admission letters.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
