// Health monitor snapshots.

use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::broker::Broker;
use crate::http::Controller;
use crate::monitor::MonitorSnapshot;

pub const MONITORS_PATH: &str = "/broker/monitors";

#[derive(Debug, Serialize)]
pub struct MonitorsBody {
    pub enabled: bool,
    pub active: usize,
    pub monitors: Vec<MonitorSnapshot>,
}

/// Lists every running health monitor with its last known status.
#[derive(Clone)]
pub struct MonitorsController {
    broker: Arc<Broker>,
}

impl MonitorsController {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    fn body(&self) -> MonitorsBody {
        let monitors = self.broker.monitors();
        MonitorsBody {
            enabled: self.broker.monitor().is_some(),
            active: monitors.len(),
            monitors,
        }
    }
}

impl Controller for MonitorsController {
    fn add_route(&self, router: Router) -> Router {
        let controller = self.clone();
        router.route(
            MONITORS_PATH,
            get(move || {
                let controller = controller.clone();
                async move { Json(controller.body()) }
            }),
        )
    }
}
