//! ABOUTME: Process-level wiring for the stanbase binary
//! ABOUTME: Server startup, the cache sweeper, admin bootstrap and reference seeding

pub mod admin;
pub mod seed;
pub mod server;
