//! Oscar: a module CDN edge service.
//!
//! The request pipeline lives in `oscar-core`; this crate supplies the
//! production collaborators (GraphQL metadata, object storage, esbuild) and
//! the HTTP server around them.

pub mod config;
pub mod esbuild;
pub mod fetch;
pub mod graphql;
pub mod logging;
pub mod server;
pub mod storage;

pub use server::{router, serve, AppState};
