//! Server plumbing around the volsyncd core: environment configuration and
//! the HTTP front door.

pub mod config;
pub mod http;
