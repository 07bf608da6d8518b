// src/executor/kubernetes/api.rs

//! Cluster API boundary.
//!
//! The executor only needs four pod operations; [`PodApi`] captures them so
//! tests can swap in an in-memory cluster. [`RestPodApi`] talks to a real API
//! server over the core/v1 REST endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::trace;

use super::model::Pod;
use crate::errors::{ExecError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait PodApi: Send + Sync {
    /// Submit a pod; returns the object as stored by the API server.
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod>;

    /// Fetch a pod; `None` when it does not exist (any more).
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    /// Delete a pod immediately. Deleting a missing pod is not an error.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Combined container output of a pod.
    async fn pod_logs(&self, namespace: &str, name: &str, container: &str) -> Result<String>;
}

/// `PodApi` over HTTP(S) with optional bearer-token auth.
#[derive(Debug, Clone)]
pub struct RestPodApi {
    client: Client,
    api_server: String,
    token: Option<String>,
}

impl RestPodApi {
    pub fn new(api_server: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExecError::ClusterApi(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_server: api_server.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn pods_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{}/pods", self.api_server, namespace)
    }

    fn pod_url(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.pods_url(namespace), name)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        trace!(%method, url, "kubernetes API request");
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl PodApi for RestPodApi {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        let context = format!("creating pod {:?}", pod.metadata.name);
        let resp = self
            .request(Method::POST, &self.pods_url(namespace))
            .json(pod)
            .send()
            .await
            .map_err(|e| api_error(&context, e))?;

        let resp = ensure_success(resp, &context).await?;
        resp.json::<Pod>().await.map_err(|e| api_error(&context, e))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let context = format!("getting pod {name:?}");
        let resp = self
            .request(Method::GET, &self.pod_url(namespace, name))
            .send()
            .await
            .map_err(|e| api_error(&context, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp, &context).await?;
        let pod = resp.json::<Pod>().await.map_err(|e| api_error(&context, e))?;
        Ok(Some(pod))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let context = format!("deleting pod {name:?}");
        let url = format!("{}?gracePeriodSeconds=0", self.pod_url(namespace, name));
        let resp = self
            .request(Method::DELETE, &url)
            .send()
            .await
            .map_err(|e| api_error(&context, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(resp, &context).await?;
        Ok(())
    }

    async fn pod_logs(&self, namespace: &str, name: &str, container: &str) -> Result<String> {
        let context = format!("reading logs of pod {name:?}");
        let url = format!("{}/log?container={}", self.pod_url(namespace, name), container);
        let resp = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| api_error(&context, e))?;

        let resp = ensure_success(resp, &context).await?;
        resp.text().await.map_err(|e| api_error(&context, e))
    }
}

async fn ensure_success(resp: Response, context: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ExecError::ClusterApi(format!(
        "{context}: HTTP {status}: {}",
        body.trim()
    )))
}

fn api_error(context: &str, err: reqwest::Error) -> ExecError {
    ExecError::ClusterApi(format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_core_v1_urls() {
        let api = RestPodApi::new("https://k8s.local:6443/", None).unwrap();
        assert_eq!(
            api.pods_url("bench"),
            "https://k8s.local:6443/api/v1/namespaces/bench/pods"
        );
        assert_eq!(
            api.pod_url("bench", "swan-1"),
            "https://k8s.local:6443/api/v1/namespaces/bench/pods/swan-1"
        );
    }
}
