//! Session lifecycle service for the careerhub mentoring platform.
//!
//! Keeps a live, reconciled view of mentoring sessions, derives each
//! session's joinability from the clock, and completes sessions whose
//! window has passed.

pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;
pub mod validation;
