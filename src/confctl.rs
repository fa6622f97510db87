// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Control-plane client for the pooled state of discovery records.
//!
//! The control plane is the system of record for "is this discovery record pooled in
//! this datacenter". Authoritative DNS servers render their answers from it.
//!
//! [`HttpControlPlane`] talks to a confctl-like REST API:
//!
//! - `GET  {base}/v1/discovery?name=<record>&datacenter=<dc>` → `[ServiceRef, ...]`
//! - `PUT  {base}/v1/discovery/<record>/<dc>` with `{"pooled": bool}`
//! - `PUT  {base}/v1/discovery/<record>/ttl` with `{"ttl": n}`
//!
//! All calls go through [`retry_control_plane_call`], so transient failures are
//! retried with exponential backoff.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::constants::CONTROL_PLANE_TIMEOUT_SECS;
use crate::dns_errors::ControlPlaneError;
use crate::reconcilers::retry::retry_control_plane_call;

/// One discovery object in the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    /// Discovery record name
    pub name: String,
    /// Datacenter of this object
    pub datacenter: String,
    /// Whether the record is pooled in the datacenter
    pub pooled: bool,
    /// TTL of the rendered record, if the control plane tracks it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

/// Selection of discovery objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    /// Only objects of this record
    pub name: Option<String>,
    /// Only objects in this datacenter
    pub datacenter: Option<String>,
}

impl ServiceFilter {
    /// Select every datacenter of one record.
    #[must_use]
    pub fn name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            datacenter: None,
        }
    }

    /// Select one record in one datacenter.
    #[must_use]
    pub fn exact(name: &str, datacenter: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            datacenter: Some(datacenter.to_string()),
        }
    }

    /// Whether an object is selected by this filter.
    #[must_use]
    pub fn matches(&self, service: &ServiceRef) -> bool {
        self.name.as_ref().map_or(true, |n| *n == service.name)
            && self
                .datacenter
                .as_ref()
                .map_or(true, |dc| *dc == service.datacenter)
    }
}

/// Reads and writes the pooled state of discovery records.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Whether `service` is pooled in `datacenter`.
    async fn get_pooled(&self, service: &str, datacenter: &str)
        -> Result<bool, ControlPlaneError>;

    /// Pool or depool `service` in `datacenter`.
    async fn set_pooled(
        &self,
        service: &str,
        datacenter: &str,
        pooled: bool,
    ) -> Result<(), ControlPlaneError>;

    /// Enumerate discovery objects matching a filter.
    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceRef>, ControlPlaneError>;

    /// Change the TTL the authoritative servers render for `service`.
    async fn set_ttl(&self, service: &str, ttl: u32) -> Result<(), ControlPlaneError>;
}

/// Control-plane client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: HttpClient,
    base: Url,
}

impl HttpControlPlane {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client can't be built.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Control plane URL {base_url} cannot be used as a base URL");
        }
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(CONTROL_PLANE_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn transport_error(&self, err: &reqwest::Error) -> ControlPlaneError {
        if err.is_decode() {
            ControlPlaneError::InvalidResponse {
                endpoint: self.base.to_string(),
                reason: err.to_string(),
            }
        } else {
            ControlPlaneError::Unreachable {
                endpoint: self.base.to_string(),
                reason: err.to_string(),
            }
        }
    }

    async fn status_error(
        response: reqwest::Response,
        service: &str,
        datacenter: &str,
    ) -> ControlPlaneError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return ControlPlaneError::NotFound {
                service: service.to_string(),
                datacenter: datacenter.to_string(),
            };
        }
        let reason = response.text().await.unwrap_or_default();
        ControlPlaneError::RequestFailed {
            service: service.to_string(),
            datacenter: datacenter.to_string(),
            status_code: status.as_u16(),
            reason,
        }
    }

    async fn list_once(&self, filter: &ServiceFilter) -> Result<Vec<ServiceRef>, ControlPlaneError> {
        let mut url = self.endpoint(&["v1", "discovery"]);
        {
            let mut query = url.query_pairs_mut();
            if let Some(name) = &filter.name {
                query.append_pair("name", name);
            }
            if let Some(dc) = &filter.datacenter {
                query.append_pair("datacenter", dc);
            }
        }
        debug!(url = %url, "Listing discovery objects");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        if !response.status().is_success() {
            return Err(Self::status_error(
                response,
                filter.name.as_deref().unwrap_or("*"),
                filter.datacenter.as_deref().unwrap_or("*"),
            )
            .await);
        }
        let services: Vec<ServiceRef> = response
            .json()
            .await
            .map_err(|e| ControlPlaneError::InvalidResponse {
                endpoint: self.base.to_string(),
                reason: e.to_string(),
            })?;
        Ok(services.into_iter().filter(|s| filter.matches(s)).collect())
    }

    async fn put_once(
        &self,
        url: Url,
        body: &serde_json::Value,
        service: &str,
        datacenter: &str,
    ) -> Result<(), ControlPlaneError> {
        debug!(url = %url, body = %body, "Writing to control plane");
        let response = self
            .client
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response, service, datacenter).await)
        }
    }
}

#[async_trait]
impl ControlPlaneClient for HttpControlPlane {
    async fn get_pooled(
        &self,
        service: &str,
        datacenter: &str,
    ) -> Result<bool, ControlPlaneError> {
        let filter = ServiceFilter::exact(service, datacenter);
        let services = retry_control_plane_call(
            || self.list_once(&filter),
            &format!("get {service}/{datacenter}"),
        )
        .await?;
        services
            .first()
            .map(|s| s.pooled)
            .ok_or_else(|| ControlPlaneError::NotFound {
                service: service.to_string(),
                datacenter: datacenter.to_string(),
            })
    }

    async fn set_pooled(
        &self,
        service: &str,
        datacenter: &str,
        pooled: bool,
    ) -> Result<(), ControlPlaneError> {
        let url = self.endpoint(&["v1", "discovery", service, datacenter]);
        let body = json!({ "pooled": pooled });
        retry_control_plane_call(
            || self.put_once(url.clone(), &body, service, datacenter),
            &format!("set {service}/{datacenter} pooled={pooled}"),
        )
        .await
    }

    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceRef>, ControlPlaneError> {
        retry_control_plane_call(|| self.list_once(filter), "list discovery objects").await
    }

    async fn set_ttl(&self, service: &str, ttl: u32) -> Result<(), ControlPlaneError> {
        let url = self.endpoint(&["v1", "discovery", service, "ttl"]);
        let body = json!({ "ttl": ttl });
        retry_control_plane_call(
            || self.put_once(url.clone(), &body, service, "*"),
            &format!("set {service} ttl={ttl}"),
        )
        .await
    }
}

#[cfg(test)]
#[path = "confctl_tests.rs"]
mod confctl_tests;
