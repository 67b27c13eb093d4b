//! Middleware for observability, auth, and rate limiting.
//!
//! This module provides:
//! - Request logging with latency tracking
//! - Rate limiting per IP address
//! - Webhook/cron secret and admin-role gates

pub mod auth;
pub mod logging;
pub mod rate_limit;

pub use logging::{request_logging, request_logging_simple};
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
