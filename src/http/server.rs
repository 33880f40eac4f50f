//! Binds and runs the peer HTTP server (spec §4.E) on a dedicated OS thread
//! with its own tokio runtime, mirroring the teacher's `Runner`/
//! `run_status_server` split: `spawn` blocks the caller until the listener
//! has either bound successfully or failed, then hands back a
//! [`RunningHttpServer`] for graceful shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpServer};
use thiserror::Error;

use crate::cluster::ClusterContext;
use crate::http::handlers;
use crate::http::state::AppState;
use crate::supervisor::Supervisor;

#[derive(Error, Debug)]
pub enum HttpServerError {
    #[error("could not bind peer HTTP server to `{addr}`: `{source}`")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("peer HTTP server thread ended before it could report readiness")]
    StartupChannelClosed,
}

/// A peer HTTP server running on its own thread. `handle` drives graceful
/// shutdown (spec §5 "the shutdown path is bounded"); `stop` also waits for
/// the owning thread to fully exit.
pub struct RunningHttpServer {
    pub handle: ServerHandle,
    join: JoinHandle<()>,
}

impl RunningHttpServer {
    /// Requests a graceful stop (waits for in-flight requests) and blocks
    /// until the server's thread has exited.
    pub fn stop(self) {
        let handle = self.handle.clone();
        tokio::runtime::Runtime::new()
            .expect("building a throwaway runtime to drive server shutdown")
            .block_on(handle.stop(true));
        let _ = self.join.join();
    }
}

/// Spawns the peer HTTP server on a dedicated OS thread with its own
/// multi-threaded tokio runtime, binding `addr` (spec §6: "binds a
/// container-namespace address while logging both that and the host-
/// namespace address" — namespace translation is the runner's concern;
/// this binds whatever address the caller resolved).
pub fn spawn(
    addr: SocketAddr,
    cluster_ctx: Arc<dyn ClusterContext>,
    supervisor: Arc<Supervisor>,
) -> Result<RunningHttpServer, HttpServerError> {
    let (ready_tx, ready_rx) = mpsc::channel();

    let join = thread::Builder::new()
        .name("http-server".to_string())
        .spawn(move || run(addr, cluster_ctx, supervisor, ready_tx))
        .expect("failed to spawn the peer HTTP server thread");

    match ready_rx.recv() {
        Ok(Ok(handle)) => Ok(RunningHttpServer { handle, join }),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(HttpServerError::StartupChannelClosed),
    }
}

fn run(
    addr: SocketAddr,
    cluster_ctx: Arc<dyn ClusterContext>,
    supervisor: Arc<Supervisor>,
    ready_tx: mpsc::Sender<Result<ServerHandle, HttpServerError>>,
) {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(source) => {
            let _ = ready_tx.send(Err(HttpServerError::Bind { addr, source }));
            return;
        }
    };

    runtime.block_on(async move {
        let state = web::Data::new(AppState {
            cluster_ctx,
            supervisor,
        });

        let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(handlers::configure)).bind(addr);
        let server = match server {
            Ok(server) => server.run(),
            Err(source) => {
                let _ = ready_tx.send(Err(HttpServerError::Bind { addr, source }));
                return;
            }
        };

        let _ = ready_tx.send(Ok(server.handle()));
        let _ = server.await;
    });
}
