//! Portcullis - session-based authentication with local and Facebook login
//!
//! This library provides the building blocks of the Portcullis server:
//! account storage, login strategies, server-side sessions and the HTTP
//! routes that tie them together.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod session;
