//! Peer HTTP Server (spec §4.E): join/leave, process listing, endpoint
//! discovery, log fetch, shutdown, and the leader-change callback, plus the
//! central error/redirect mapper (spec §4.F) every handler routes through.

mod error;
mod handlers;
mod server;
mod state;
mod wire;

pub use error::HttpError;
pub use server::{spawn, HttpServerError, RunningHttpServer};
pub use state::AppState;
pub use wire::{
    EndpointList, ErrorResponse, GoodbyeRequest, HelloRequest, IdInfo, ProcessList, ServerProcess,
    VersionInfo,
};
