use crate::{
    k8s::{Pod, PodSpec},
    validation::{self, PolicyLookup, Verdict},
};
use anyhow::{anyhow, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::{
    core::{admission::Operation, DynamicObject},
    Resource,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Validates that pods only reference SELinux policies from their own
/// namespace.
#[derive(Clone)]
pub struct Admission {
    policies: Arc<dyn PolicyLookup>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

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
            let review: AdmissionReview = match serde_json::from_reader(bytes.reader()) {
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
    pub fn new(policies: Arc<dyn PolicyLookup>) -> Self {
        Self { policies }
    }

    async fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);

        if !matches!(req.operation, Operation::Create | Operation::Update) {
            return rsp;
        }

        if !is_kind::<Pod>(&req) {
            return errored(
                rsp,
                500,
                anyhow!(
                    "unsupported resource type: {}.{}.{}",
                    req.kind.group,
                    req.kind.version,
                    req.kind.kind
                ),
            );
        }

        let ns = req.namespace.clone().unwrap_or_default();
        let (name, spec) = match parse_pod_spec(req) {
            Ok(parsed) => parsed,
            Err(error) => {
                info!(%error, "Failed to parse Pod spec");
                return errored(rsp, 400, error);
            }
        };

        match validation::validate_pod(&*self.policies, &ns, &spec).await {
            Verdict::Allowed => rsp,
            Verdict::Denied(reason) => {
                info!(%ns, %name, %reason, "Denied");
                rsp.deny(reason)
            }
            Verdict::Errored(code, error) => {
                warn!(%ns, %name, %error, "Failed to validate Pod");
                errored(rsp, code, error)
            }
        }
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

/// Rejects a request because it could not be evaluated.
fn errored(rsp: AdmissionResponse, code: u16, error: anyhow::Error) -> AdmissionResponse {
    let mut rsp = rsp.deny(format!("{error:#}"));
    rsp.result.code = code;
    rsp
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

/// Returns the pod's name, which may be empty for pods with generated names,
/// and its spec.
fn parse_pod_spec(req: AdmissionRequest) -> Result<(String, PodSpec)> {
    let obj = req
        .object
        .ok_or_else(|| anyhow!("admission request missing 'object'"))?;

    let spec = {
        let data = obj
            .data
            .get("spec")
            .cloned()
            .ok_or_else(|| anyhow!("admission request missing 'spec'"))?;
        serde_json::from_value(data)?
    };

    Ok((obj.metadata.name.unwrap_or_default(), spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ResourceId;

    struct Policies(Vec<ResourceId>);

    #[async_trait::async_trait]
    impl PolicyLookup for Policies {
        async fn policy_exists(&self, id: &ResourceId) -> Result<bool> {
            Ok(self.0.contains(id))
        }
    }

    fn admission() -> Admission {
        Admission::new(Arc::new(Policies(vec![ResourceId::new("bar", "foo")])))
    }

    fn request(
        operation: &str,
        group: &str,
        version: &str,
        kind: &str,
        object: serde_json::Value,
    ) -> AdmissionRequest {
        let review: AdmissionReview = serde_json::from_value(serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "3f5a1c7e-4a1b-4e57-9c7d-52a4c0b8e001",
                "kind": { "group": group, "version": version, "kind": kind },
                "resource": { "group": group, "version": version, "resource": "pods" },
                "namespace": "bar",
                "operation": operation,
                "userInfo": {},
                "object": object,
            },
        }))
        .expect("review must parse");
        review.try_into().expect("review must contain a request")
    }

    fn pod(selinux_type: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "app", "namespace": "bar" },
            "spec": {
                "containers": [{ "name": "app", "image": "busybox" }],
                "securityContext": { "seLinuxOptions": { "type": selinux_type } },
            },
        })
    }

    async fn admit(req: AdmissionRequest) -> AdmissionResponse {
        admission().admit(req).await
    }

    #[tokio::test]
    async fn admits_pod_with_existing_policy() {
        let rsp = admit(request("CREATE", "", "v1", "Pod", pod("foo_bar.process"))).await;
        assert!(rsp.allowed);
    }

    #[tokio::test]
    async fn denies_pod_with_missing_policy() {
        let rsp = admit(request("UPDATE", "", "v1", "Pod", pod("baz_bar.process"))).await;
        assert!(!rsp.allowed);
        assert!(rsp.result.message.contains("baz"), "{}", rsp.result.message);
    }

    #[tokio::test]
    async fn ignores_other_operations() {
        let rsp = admit(request("CONNECT", "", "v1", "Pod", pod("baz_bar.process"))).await;
        assert!(rsp.allowed);
    }

    #[tokio::test]
    async fn errors_on_other_kinds() {
        let obj = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm", "namespace": "bar" },
            "data": {},
        });
        let rsp = admit(request("CREATE", "", "v1", "ConfigMap", obj)).await;
        assert!(!rsp.allowed);
        assert_eq!(rsp.result.code, 500);
    }

    #[tokio::test]
    async fn errors_on_malformed_pod() {
        let obj = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "app", "namespace": "bar" },
            "spec": { "containers": "not-a-list" },
        });
        let rsp = admit(request("CREATE", "", "v1", "Pod", obj)).await;
        assert!(!rsp.allowed);
        assert_eq!(rsp.result.code, 400);
    }
}
