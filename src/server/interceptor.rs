//! gRPC interceptor chain.
//!
//! Interceptors run in the order they were added; the first rejection
//! short-circuits the rest and the handler is never reached.

use std::fmt;
use std::sync::Arc;

use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};
use uuid::Uuid;

/// Header / metadata key carrying the request ID on both transports.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request ID attached to request extensions by [`request_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The caller's ID when it is usable, else a fresh one.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type InterceptFn = dyn Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync;

/// Ordered list of named interceptors, usable as one tonic [`Interceptor`].
#[derive(Clone, Default)]
pub struct InterceptorChain {
    steps: Vec<(&'static str, Arc<InterceptFn>)>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; it runs after every one already added.
    pub fn with<F>(mut self, name: &'static str, step: F) -> Self
    where
        F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
    {
        self.steps.push((name, Arc::new(step)));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Interceptor for InterceptorChain {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.steps
            .iter()
            .try_fold(request, |request, (_, step)| step(request))
    }
}

/// The chain installed on the gRPC binding: request-ID tagging first.
pub fn default_chain() -> InterceptorChain {
    InterceptorChain::new().with("request-id", request_id)
}

/// Ensure the call carries an `x-request-id`, reusing the caller's.
pub fn request_id(mut request: Request<()>) -> Result<Request<()>, Status> {
    let id = RequestId::from_header(
        request
            .metadata()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let value: AsciiMetadataValue = id
        .as_str()
        .parse()
        .map_err(|_| Status::invalid_argument("malformed x-request-id"))?;
    request.metadata_mut().insert(REQUEST_ID_HEADER, value);
    request.extensions_mut().insert(id);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn request_id_generated_when_missing() {
        let mut chain = default_chain();
        let request = chain.call(Request::new(())).unwrap();
        let id = request.extensions().get::<RequestId>().unwrap();
        assert_eq!(id.as_str().len(), 36, "expected a UUID, got {id}");
        assert_eq!(
            request.metadata().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap(),
            id.as_str()
        );
    }

    #[test]
    fn request_id_preserved_when_present() {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(REQUEST_ID_HEADER, "abc-123".parse().unwrap());
        let request = request_id(request).unwrap();
        assert_eq!(
            request.extensions().get::<RequestId>(),
            Some(&RequestId("abc-123".to_string()))
        );
    }

    #[test]
    fn blank_request_id_replaced() {
        assert_ne!(RequestId::from_header(Some("  ")).as_str(), "  ");
        assert_eq!(RequestId::from_header(Some("x")).as_str(), "x");
    }

    #[test]
    fn chain_runs_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        let mut chain = InterceptorChain::new()
            .with("first", move |req| {
                a.lock().unwrap().push("first");
                Ok(req)
            })
            .with("second", move |req| {
                b.lock().unwrap().push("second");
                Ok(req)
            });

        chain.call(Request::new(())).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(chain.names(), vec!["first", "second"]);
    }

    #[test]
    fn rejection_short_circuits() {
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();
        let mut chain = InterceptorChain::new()
            .with("deny", |_| Err(Status::unauthenticated("no token")))
            .with("after", move |req| {
                *flag.lock().unwrap() = true;
                Ok(req)
            });

        let status = chain.call(Request::new(())).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn empty_chain_passes_through() {
        let mut chain = InterceptorChain::new();
        assert!(chain.is_empty());
        assert!(chain.call(Request::new(())).is_ok());
    }
}
