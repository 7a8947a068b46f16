use std::sync::Arc;

use http::Request;

use crate::matchers::RequestHead;
use crate::store::CandidateStore;

/// Filters the current snapshot for a single request.
#[derive(Debug, Clone)]
pub struct RequestResolver {
    store: Arc<CandidateStore>,
}

impl RequestResolver {
    pub fn new(store: Arc<CandidateStore>) -> Self {
        Self { store }
    }

    pub fn resolve<B>(&self, req: &Request<B>) -> Vec<String> {
        self.resolve_head(&RequestHead::from_request(req))
    }

    /// Dial targets of every candidate whose matchers all accept `req`, in
    /// snapshot order. The snapshot is read once.
    pub fn resolve_head(&self, req: &RequestHead<'_>) -> Vec<String> {
        let snapshot = self.store.read_all();
        snapshot
            .iter()
            .filter(|c| c.matches(req))
            .map(|c| c.dial().to_string())
            .collect()
    }
}
