//! Endpoint handlers for the peer HTTP server (spec §4.E).

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::cluster::{ClusterContextError, HelloRequestFields, ServerType};
use crate::http::error::HttpError;
use crate::http::state::AppState;
use crate::http::wire::{
    EndpointList, GoodbyeRequest, HelloRequest, IdInfo, ProcessList, ServerProcess, VersionInfo,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/hello", web::get().to(hello_get))
        .route("/hello", web::post().to(hello_post))
        .route("/goodbye", web::post().to(goodbye))
        .route("/id", web::route().to(id_handler))
        .route("/process", web::route().to(process_handler))
        .route("/endpoints", web::route().to(endpoints_handler))
        .route("/logs/{role}", web::route().to(logs_handler))
        .route("/version", web::route().to(version_handler))
        .route("/shutdown", web::post().to(shutdown_handler))
        .route("/cb/masterChanged", web::post().to(master_changed_handler));
}

/// `host, _ := splitHostPort(request.Host); normalize(host)` (spec §4.E).
/// `normalize` folds the `localhost` alias to the loopback address other
/// peers would actually dial.
fn derive_own_address(req: &HttpRequest) -> String {
    let host_header = req.connection_info().host().to_string();
    normalize_host(&split_host_port(&host_header))
}

fn split_host_port(host_header: &str) -> String {
    if let Some(rest) = host_header.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest).to_string();
    }
    host_header
        .rsplit_once(':')
        .map(|(host, _)| host.to_string())
        .unwrap_or_else(|| host_header.to_string())
}

fn normalize_host(host: &str) -> String {
    if host.eq_ignore_ascii_case("localhost") {
        "127.0.0.1".to_string()
    } else {
        host.to_string()
    }
}

fn derive_remote_address(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn cluster_error_to_http(err: ClusterContextError) -> HttpError {
    match err {
        ClusterContextError::EmptySlaveId => HttpError::BadRequest(err.to_string()),
        ClusterContextError::DuplicatePeer(_) => HttpError::PreconditionFailed(err.to_string()),
        ClusterContextError::UnknownPeer(_) => HttpError::NotFound(err.to_string()),
        ClusterContextError::SnapshotWrite { .. }
        | ClusterContextError::SnapshotRead { .. }
        | ClusterContextError::SnapshotParse { .. } => HttpError::Internal(err.to_string()),
    }
}

fn parse_logs_role(segment: &str) -> Option<ServerType> {
    match segment {
        "agent" => Some(ServerType::Agent),
        "dbserver" => Some(ServerType::DbServer),
        "coordinator" => Some(ServerType::Coordinator),
        "single" => Some(ServerType::Single),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct HelloQuery {
    #[serde(default)]
    is_update: bool,
}

async fn hello_get(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, HttpError> {
    let own_addr = derive_own_address(&req);
    let remote_addr = derive_remote_address(&req);
    let config = state
        .cluster_ctx
        .handle_hello(&own_addr, &remote_addr, None, true)
        .map_err(cluster_error_to_http)?;
    Ok(HttpResponse::Ok().json(config))
}

async fn hello_post(
    req: HttpRequest,
    query: web::Query<HelloQuery>,
    body: web::Json<HelloRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, HttpError> {
    let own_addr = derive_own_address(&req);
    let remote_addr = derive_remote_address(&req);
    let body = body.into_inner();
    let fields = HelloRequestFields {
        slave_id: body.slave_id,
        slave_address: body.slave_address,
        slave_port: body.slave_port,
        data_dir: body.data_dir,
        is_secure: body.is_secure,
        agent: body.agent,
        dbserver: body.dbserver,
        coordinator: body.coordinator,
    };
    let config = state
        .cluster_ctx
        .handle_hello(&own_addr, &remote_addr, Some(fields), query.is_update)
        .map_err(cluster_error_to_http)?;
    Ok(HttpResponse::Ok().json(config))
}

async fn goodbye(body: web::Json<GoodbyeRequest>, state: web::Data<AppState>) -> Result<HttpResponse, HttpError> {
    if body.slave_id.is_empty() {
        return Err(HttpError::BadRequest("SlaveID must not be empty".to_string()));
    }
    let removed = state
        .cluster_ctx
        .handle_goodbye(&body.slave_id)
        .map_err(cluster_error_to_http)?;
    if removed {
        Ok(HttpResponse::Ok().body("BYE"))
    } else {
        Err(HttpError::NotFound("Unknown ID".to_string()))
    }
}

async fn id_handler(state: web::Data<AppState>) -> impl Responder {
    let (_, own_peer, _) = state.cluster_ctx.cluster_config();
    HttpResponse::Ok().json(IdInfo {
        id: own_peer.map(|p| p.id).unwrap_or_default(),
    })
}

async fn process_handler(state: web::Data<AppState>) -> impl Responder {
    let (_, own_peer, _) = state.cluster_ctx.cluster_config();
    let address = own_peer.as_ref().map(|p| p.address.clone()).unwrap_or_default();
    let is_secure = own_peer.as_ref().map(|p| p.is_secure).unwrap_or(false);

    let expected = state.supervisor.hosted_roles();
    let mut servers = Vec::with_capacity(expected.len());
    for role in &expected {
        let Some(slot) = state.supervisor.slot(*role) else {
            continue;
        };
        let Some(info) = slot.snapshot() else {
            continue;
        };
        servers.push(ServerProcess {
            server_type: role.as_str().to_string(),
            ip: address.clone(),
            port: state.cluster_ctx.server_port(*role),
            process_id: info.process_id,
            container_id: info.container_id.unwrap_or_default(),
            container_ip: info.container_ip.unwrap_or_default(),
            is_secure,
        });
    }
    let servers_started = servers.len() == expected.len();
    HttpResponse::Ok().json(ProcessList {
        servers,
        servers_started,
    })
}

async fn endpoints_handler(state: web::Data<AppState>) -> Result<HttpResponse, HttpError> {
    let status = state.cluster_ctx.is_running_master();
    if status.is_running_master {
        let (config, _, _) = state.cluster_ctx.cluster_config();
        return Ok(HttpResponse::Ok().json(EndpointList {
            starters: config.peer_endpoints(),
            agents: config.agent_endpoints(),
            coordinators: config.coordinator_endpoints(),
        }));
    }
    match status.master_url.filter(|_| status.is_running) {
        Some(master_url) => Err(HttpError::redirect_to(&master_url, "/endpoints")),
        None => Err(HttpError::ServiceUnavailable("No runtime master known".to_string())),
    }
}

async fn logs_handler(path: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse, HttpError> {
    let segment = path.into_inner();
    let Some(role) = parse_logs_role(&segment) else {
        return Err(HttpError::NotFound(format!("no such log `{segment}`")));
    };

    let (_, own_peer, _) = state.cluster_ctx.cluster_config();
    let hosted = own_peer.map(|p| p.hosts(role)).unwrap_or(false);
    if !hosted {
        return Err(HttpError::NotFound(format!("{role} is not hosted by this peer")));
    }

    let log_path = state.cluster_ctx.server_host_log_file(role);
    let Some(dir) = log_path.parent() else {
        return Err(HttpError::ServiceUnavailable(format!("{role} log directory not ready")));
    };
    if !dir.is_dir() {
        return Err(HttpError::ServiceUnavailable(format!("{role} log directory not ready")));
    }

    let body = match std::fs::read_to_string(&log_path) {
        Ok(body) => body,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(HttpError::Internal(source.to_string())),
    };
    Ok(HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(body))
}

async fn version_handler() -> impl Responder {
    HttpResponse::Ok().json(VersionInfo {
        version: crate::version::VERSION.to_string(),
        build: crate::version::BUILD.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct ShutdownQuery {
    mode: Option<String>,
}

async fn shutdown_handler(
    query: web::Query<ShutdownQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, HttpError> {
    if query.mode.as_deref() == Some("goodbye") {
        state
            .cluster_ctx
            .send_master_leave_cluster()
            .map_err(cluster_error_to_http)?;
    }
    state.cluster_ctx.stop();
    Ok(HttpResponse::Ok().body("OK"))
}

async fn master_changed_handler(state: web::Data<AppState>) -> impl Responder {
    state.cluster_ctx.master_changed_callback();
    HttpResponse::Ok().body("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{LocalClusterContext, Peer, ServiceMode};
    use crate::context::Context;
    use crate::runner::MockProcessRunner;
    use crate::supervisor::Supervisor;
    use actix_web::{test, App};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn own_peer() -> Peer {
        Peer {
            id: "peer-a".to_string(),
            address: "10.0.0.1".to_string(),
            port_offset: 0,
            has_agent: false,
            has_dbserver: true,
            has_coordinator: true,
            has_resilient_single: false,
            is_secure: false,
        }
    }

    fn test_state(dir: &std::path::Path) -> web::Data<AppState> {
        let cluster_ctx: Arc<dyn crate::cluster::ClusterContext> = Arc::new(LocalClusterContext::new(
            own_peer(),
            ServiceMode::Cluster,
            8528,
            dir.to_path_buf(),
            Context::new(),
        ));
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&cluster_ctx),
            Arc::new(MockProcessRunner::new()),
            Arc::new(crate::supervisor::LatchingUpgradeManager::new()),
            Context::new(),
            false,
            PathBuf::from("/usr/sbin/arangod"),
            PathBuf::from("/usr/sbin/arangosync"),
            5,
            false,
        ));
        web::Data::new(AppState {
            cluster_ctx,
            supervisor,
        })
    }

    #[actix_web::test]
    async fn id_returns_own_peer_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/id").to_request();
        let body: IdInfo = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.id, "peer-a");
    }

    #[actix_web::test]
    async fn goodbye_unknown_id_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/goodbye")
            .set_json(GoodbyeRequest {
                slave_id: "ghost".to_string(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn logs_for_unhosted_role_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        // own_peer() has has_agent = false.
        let req = test::TestRequest::get().uri("/logs/agent").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn logs_missing_file_is_empty_200() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        std::fs::create_dir_all(dir.path().join("dbserver")).unwrap();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/logs/dbserver").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert!(body.is_empty());
    }

    #[actix_web::test]
    async fn endpoints_is_unavailable_when_no_master_is_known() {
        let dir = tempfile::tempdir().unwrap();
        let cluster_ctx: Arc<dyn crate::cluster::ClusterContext> = Arc::new(LocalClusterContext::new(
            own_peer(),
            ServiceMode::Cluster,
            8528,
            dir.path().to_path_buf(),
            Context::new(),
        ));
        // A second peer makes this one no longer the sole (hence non-master) peer.
        cluster_ctx
            .handle_hello(
                "peer-a",
                "10.0.0.2",
                Some(HelloRequestFields {
                    slave_id: "peer-b".to_string(),
                    slave_address: Some("10.0.0.2".to_string()),
                    slave_port: Some(0),
                    data_dir: None,
                    is_secure: false,
                    agent: None,
                    dbserver: None,
                    coordinator: None,
                }),
                false,
            )
            .unwrap();

        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&cluster_ctx),
            Arc::new(MockProcessRunner::new()),
            Arc::new(crate::supervisor::LatchingUpgradeManager::new()),
            Context::new(),
            false,
            PathBuf::from("/usr/sbin/arangod"),
            PathBuf::from("/usr/sbin/arangosync"),
            5,
            false,
        ));
        let state = web::Data::new(AppState {
            cluster_ctx,
            supervisor,
        });
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/endpoints").to_request();
        let resp = test::call_service(&app, req).await;
        // This crate models no multi-peer master election (spec.md
        // Non-goals), so a peer that isn't alone has no master to redirect
        // to and reports unavailable instead of pointing at itself.
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
