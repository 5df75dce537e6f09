//! Process-wide daemon state, constructed once in `main` and shared by
//! every connection.

use std::sync::Arc;

use crate::admin::AdminService;
use crate::engine::TicketLifecycleEngine;

pub struct DaemonState {
    pub engine: Arc<TicketLifecycleEngine>,
    pub admin: AdminService,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl DaemonState {
    pub fn new(engine: Arc<TicketLifecycleEngine>) -> Self {
        let admin = AdminService::new(
            engine.config().clone(),
            engine.panel().clone(),
            engine.transport().clone(),
        );
        Self {
            engine,
            admin,
            started_at: chrono::Utc::now(),
        }
    }
}
