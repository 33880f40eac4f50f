//! Shared state handed to every handler via `web::Data` (spec §4.E), mirroring
//! the teacher's `web::Data<Arc<RwLock<Status>>>` pattern.

use std::sync::Arc;

use crate::cluster::ClusterContext;
use crate::supervisor::Supervisor;

pub struct AppState {
    pub cluster_ctx: Arc<dyn ClusterContext>,
    pub supervisor: Arc<Supervisor>,
}
