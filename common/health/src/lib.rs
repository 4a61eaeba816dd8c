use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Liveness reporting for the long-running parts of a service.
///
/// Every component that must keep running for the process to be useful
/// (the liveness loop, the database pool watcher, ...) registers itself and
/// receives a [`HealthHandle`]. The process is healthy only while every
/// registered component has reported within its deadline. A component that
/// misses its deadline is reported as `stalled`.
///
/// Keep one registry per probe: liveness and readiness have different
/// semantics and should not share state.
#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
    sender: mpsc::Sender<StatusUpdate>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Set on registration, before the first report
    Starting,
    /// Reported healthy, must report again before this instant
    HealthyUntil(time::OffsetDateTime),
    /// Explicitly reported unhealthy
    Unhealthy,
    /// Missed its reporting deadline
    Stalled,
}

impl ComponentStatus {
    pub fn is_healthy(&self) -> bool {
        match self {
            ComponentStatus::HealthyUntil(until) => *until > time::OffsetDateTime::now_utc(),
            _ => false,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ComponentStatus::Starting => "starting",
            ComponentStatus::HealthyUntil(_) => "healthy",
            ComponentStatus::Unhealthy => "unhealthy",
            ComponentStatus::Stalled => "stalled",
        }
    }
}

/// Snapshot of the registry, returned by the probe endpoints.
#[derive(Default, Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

#[derive(Serialize)]
struct HealthBody<'a> {
    healthy: bool,
    components: HashMap<&'a str, &'static str>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = HealthBody {
            healthy: self.healthy,
            components: self
                .components
                .iter()
                .map(|(name, status)| (name.as_str(), status.label()))
                .collect(),
        };
        let status = if self.healthy {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(body)).into_response()
    }
}

struct StatusUpdate {
    component: String,
    status: ComponentStatus,
}

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    sender: mpsc::Sender<StatusUpdate>,
}

impl HealthHandle {
    /// Report healthy until now + deadline. Must be called more often than the deadline.
    pub async fn report_healthy(&self) {
        let until = time::OffsetDateTime::now_utc().add(self.deadline);
        self.report_status(ComponentStatus::HealthyUntil(until)).await
    }

    pub async fn report_status(&self, status: ComponentStatus) {
        let update = StatusUpdate {
            component: self.component.clone(),
            status,
        };
        if let Err(err) = self.sender.send(update).await {
            warn!(component = %self.component, "failed to report health status: {}", err)
        }
    }
}

impl HealthRegistry {
    /// Must be called from within a tokio runtime: status updates are applied
    /// by a background task.
    pub fn new(name: &str) -> Self {
        let (sender, mut receiver) = mpsc::channel::<StatusUpdate>(16);
        let registry = Self {
            name: name.to_owned(),
            components: Default::default(),
            sender,
        };

        let components = registry.components.clone();
        tokio::spawn(async move {
            while let Some(update) = receiver.recv().await {
                match components.write() {
                    Ok(mut map) => {
                        map.insert(update.component, update.status);
                    }
                    // The probe will fail and the process gets restarted
                    Err(_) => warn!("poisoned health registry lock"),
                }
            }
        });

        registry
    }

    pub async fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            deadline,
            sender: self.sender.clone(),
        };
        handle.report_status(ComponentStatus::Starting).await;
        handle
    }

    /// Overall status. Unhealthy while nothing is registered. Usable as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let components = match self.components.read() {
            Ok(components) => components,
            Err(_) => {
                warn!("poisoned health registry lock");
                return HealthStatus::default();
            }
        };

        let now = time::OffsetDateTime::now_utc();
        let mut status = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::with_capacity(components.len()),
        };

        for (name, component) in components.iter() {
            let component = match component {
                ComponentStatus::HealthyUntil(until) if *until <= now => ComponentStatus::Stalled,
                other => other.clone(),
            };
            if !component.is_healthy() {
                status.healthy = false;
            }
            status.components.insert(name.clone(), component);
        }

        if status.healthy {
            debug!("{} health check ok", self.name);
        } else {
            warn!("{} health check failed: {:?}", self.name, status.components);
        }
        status
    }
}
