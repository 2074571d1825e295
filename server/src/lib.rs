//! Lost & Found Admin Server
//!
//! Back office for the lost-and-found platform: admin authentication,
//! role enforcement, TOTP second factor, audit trail and platform settings.

pub mod admin;
pub mod api;
pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod ratelimit;
pub mod settings;
