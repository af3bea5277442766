use crate::{
    core::{decide, Decision, NamespaceMeta, PolicyStore},
    k8s::{ExposedHostnames, Ingress, IngressSpec, Namespace, Resource, ResourceExt, Route, RouteSpec},
    metrics::{AdmissionMetrics, AdmissionResult},
};
use anyhow::{anyhow, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{admission::Operation, DynamicObject};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Validates that Ingresses and Routes only expose hostnames under their
/// namespace's subdomain.
#[derive(Clone)]
pub struct Admission {
    store: PolicyStore,
    namespaces: Arc<dyn LookupNamespace>,
    metrics: AdmissionMetrics,
}

/// Fetches the namespace that an admitted resource lives in.
#[async_trait::async_trait]
pub trait LookupNamespace: Send + Sync + 'static {
    async fn lookup_namespace(&self, name: &str) -> Result<Namespace>;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl AdmissionService ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: Review = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req).await
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new(
        store: PolicyStore,
        namespaces: Arc<dyn LookupNamespace>,
        metrics: AdmissionMetrics,
    ) -> Self {
        Self {
            store,
            namespaces,
            metrics,
        }
    }

    async fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        if is_kind::<Ingress>(&req) {
            return self.admit_spec::<IngressSpec>(req).await;
        }

        if is_kind::<Route>(&req) {
            return self.admit_spec::<RouteSpec>(req).await;
        }

        self.metrics.admitted("unsupported", AdmissionResult::Invalid);
        AdmissionResponse::invalid(format_args!(
            "unsupported resource type: {}.{}.{}",
            req.kind.group, req.kind.version, req.kind.kind
        ))
    }

    async fn admit_spec<T>(self, req: AdmissionRequest) -> AdmissionResponse
    where
        T: DeserializeOwned + ExposedHostnames,
    {
        let rsp = AdmissionResponse::from(&req);
        let kind = req.kind.kind.clone();

        // Deleting a resource never exposes a hostname.
        if req.operation == Operation::Delete {
            self.metrics.admitted(&kind, AdmissionResult::Allow);
            return rsp;
        }

        let req_ns = req.namespace.clone();
        let (obj, spec) = match parse_spec::<T>(req) {
            Ok(spec) => spec,
            Err(error) => {
                info!(%error, "Failed to parse {} spec", kind);
                self.metrics.admitted(&kind, AdmissionResult::Invalid);
                return rsp.deny(error);
            }
        };

        let ns = obj.namespace().or(req_ns).unwrap_or_default();
        let name = obj.name_any();
        let hostnames = spec.hostnames();

        if let Err(error) = self.validate(&ns, &hostnames).await {
            info!(%error, %ns, %name, %kind, "Denied");
            self.metrics.admitted(&kind, AdmissionResult::Deny);
            return rsp.deny(error);
        }

        self.metrics.admitted(&kind, AdmissionResult::Allow);
        rsp
    }

    async fn validate(&self, ns: &str, hostnames: &[String]) -> Result<()> {
        let namespace = self
            .namespaces
            .lookup_namespace(ns)
            .await
            .map_err(|error| anyhow!("could not get namespace: {error}"))?;
        let ns = NamespaceMeta::from(&namespace);

        let config = self.store.get();
        match decide(&config, &ns, hostnames)
            .map_err(|error| anyhow!("failed to parse namespace selector: {error}"))?
        {
            Decision::Allow(allowed) => {
                debug!(ns = %ns.name, ?hostnames, ?allowed, "Allowed");
                Ok(())
            }
            Decision::Deny(violation) => Err(violation.into()),
        }
    }
}

#[async_trait::async_trait]
impl LookupNamespace for kube::Api<Namespace> {
    async fn lookup_namespace(&self, name: &str) -> Result<Namespace> {
        self.get(name).await.map_err(Into::into)
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn parse_spec<T: DeserializeOwned>(req: AdmissionRequest) -> Result<(DynamicObject, T)> {
    let obj = req
        .object
        .ok_or_else(|| anyhow!("admission request missing 'object"))?;

    let spec = {
        let data = obj
            .data
            .get("spec")
            .cloned()
            .ok_or_else(|| anyhow!("admission request missing 'spec'"))?;
        serde_json::from_value(data)?
    };

    Ok((obj, spec))
}
