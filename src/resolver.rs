//! Field resolvers as tower services.
//!
//! The host engine owns the actual fetching; it hands each field's base
//! resolver to [`crate::Execution::wrap_resolver`] as a boxed clone service
//! and gets back the decorated stack. `None` responses mean the field was
//! suppressed and produces no value.

use std::future::Future;

use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use serde_json_bytes::Value;
use tower::BoxError;
use tower::service_fn;
use tower::util::BoxCloneService;

use crate::query::FieldPath;

/// One resolution call for one field occurrence.
#[derive(Clone, Debug)]
pub struct ResolveRequest {
    pub path: FieldPath,
    /// Current argument values, variables already substituted.
    pub arguments: Map<ByteString, Value>,
    /// The parent result node, carrying already-resolved sibling fields.
    pub parent: Value,
}

#[buildstructor::buildstructor]
impl ResolveRequest {
    #[builder]
    pub fn new(
        path: FieldPath,
        arguments: Option<Map<ByteString, Value>>,
        parent: Option<Value>,
    ) -> Self {
        Self {
            path,
            arguments: arguments.unwrap_or_default(),
            parent: parent.unwrap_or(Value::Null),
        }
    }
}

pub type BoxResolver = BoxCloneService<ResolveRequest, Option<Value>, BoxError>;

/// Build a resolver from an async closure.
pub fn resolver_fn<F, Fut>(f: F) -> BoxResolver
where
    F: FnMut(ResolveRequest) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Option<Value>, BoxError>> + Send + 'static,
{
    BoxCloneService::new(service_fn(f))
}
