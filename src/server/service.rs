//! `Core` gRPC service implementation.

use chrono::Local;
use tonic::{Request, Response, Status};
use tracing::debug;

use super::interceptor::RequestId;
use super::proto::core_server::Core;
use super::proto::{HealthzRequest, HealthzResponse, ServiceStatus};
use crate::telemetry;

/// Layout of the `timestamp` field: local time, second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The RPC service shared by every transport.
#[derive(Debug, Clone)]
pub struct CoreService {
    status: ServiceStatus,
    message: String,
}

impl Default for CoreService {
    fn default() -> Self {
        Self {
            status: ServiceStatus::Healthy,
            message: String::new(),
        }
    }
}

impl CoreService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `status` from `Healthz` instead of `HEALTHY`.
    pub fn with_status(mut self, status: ServiceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Build a health response stamped with the current local time.
    pub fn health(&self) -> HealthzResponse {
        let mut response = HealthzResponse {
            status: None,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            message: self.message.clone(),
        };
        response.set_status(self.status);
        response
    }
}

#[tonic::async_trait]
impl Core for CoreService {
    async fn healthz(
        &self,
        request: Request<HealthzRequest>,
    ) -> Result<Response<HealthzResponse>, Status> {
        let request_id = request.extensions().get::<RequestId>().cloned();
        debug!(
            request_id = request_id.as_ref().map(RequestId::as_str).unwrap_or("-"),
            "Healthz"
        );
        metrics::counter!(telemetry::GRPC_REQUESTS_TOTAL, "method" => "Healthz").increment(1);
        Ok(Response::new(self.health()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn default_reports_healthy() {
        let response = CoreService::new().health();
        assert_eq!(response.status, Some(ServiceStatus::Healthy as i32));
        assert!(response.message.is_empty());
    }

    #[test]
    fn timestamp_uses_second_precision_layout() {
        let response = CoreService::new().health();
        assert_eq!(response.timestamp.len(), 19);
        NaiveDateTime::parse_from_str(&response.timestamp, TIMESTAMP_FORMAT).unwrap();
    }

    #[test]
    fn configured_status_and_message() {
        let response = CoreService::new()
            .with_status(ServiceStatus::Unhealthy)
            .with_message("draining")
            .health();
        assert_eq!(response.status(), ServiceStatus::Unhealthy);
        assert_eq!(response.message, "draining");
    }

    #[tokio::test]
    async fn healthz_answers_without_interceptors() {
        let response = CoreService::new()
            .healthz(Request::new(HealthzRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.status(), ServiceStatus::Healthy);
    }
}
