//! [`ServiceClient`]: typed client for the `Core` service over gRPC.

use std::time::Duration;

use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Channel, Endpoint};

use crate::server::interceptor::REQUEST_ID_HEADER;
use crate::server::proto::core_client::CoreClient;
use crate::server::proto::{HealthzRequest, HealthzResponse};
use crate::{OpsxError, Result};

/// A `Core` client over one HTTP/2 channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    inner: CoreClient<Channel>,
}

impl ServiceClient {
    /// Connect to an opsx-core gRPC listener at the given address.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = ServiceClient::connect("http://127.0.0.1:7701").await?;
    /// ```
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let inner = CoreClient::connect(addr.clone()).await.map_err(|e| {
            OpsxError::Upstream(tonic::Status::unavailable(format!(
                "failed to connect to {addr}: {e}"
            )))
        })?;
        Ok(Self { inner })
    }

    /// Build a client that dials on first use.
    ///
    /// Calls made before the server accepts connections fail with
    /// `Unavailable` instead of blocking construction.
    pub fn connect_lazy(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let endpoint = Endpoint::from_shared(addr.clone())
            .map_err(|e| OpsxError::Configuration(format!("invalid gRPC target {addr:?}: {e}")))?;
        Ok(Self {
            inner: CoreClient::new(endpoint.connect_lazy()),
        })
    }

    /// Call `Core/Healthz`.
    ///
    /// `request_id` is forwarded as `x-request-id` metadata; `timeout` sets
    /// the call deadline.
    pub async fn healthz(
        &self,
        request_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<HealthzResponse> {
        let mut request = tonic::Request::new(HealthzRequest {});
        if let Some(value) = request_id.and_then(|id| id.parse::<AsciiMetadataValue>().ok()) {
            request.metadata_mut().insert(REQUEST_ID_HEADER, value);
        }
        if let Some(timeout) = timeout {
            request.set_timeout(timeout);
        }
        let response = self.inner.clone().healthz(request).await?;
        Ok(response.into_inner())
    }
}
