/// Basic application code
pub mod app;
/// Application authorization
pub mod auth;
/// REST clients for outside services
pub mod client;
/// Controllers for REST endpoints
pub mod controller;
/// Cryptography-related objects
pub mod crypto;
/// Domain objects
pub mod domain;
/// Error enums
pub mod error;
/// Offerings and their capacity
pub mod ledger;
/// Best-effort delivery of registration events
pub mod notification;
/// Waitlist promotion policy
pub mod promotion;
/// Registration transaction and retry discipline
pub mod registration;
/// Storage of offerings and coupons
pub mod repo;
/// Application settings
pub mod settings;
/// Application telemetry for tracing and logging
pub mod telemetry;
