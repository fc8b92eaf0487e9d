//! Request dispatch and resource mapping for the CIMI API.
//!
//! # Design
//! `CimiClient` owns the endpoint identity, the current credentials, and one
//! `Transport`. `dispatch` sends exactly one request and hands back the raw
//! `HttpResponse`; the typed operations layer URL templating, status checks,
//! and payload decoding on top of it. All URLs have the shape
//! `<base>/<model>[/<id>[/<action>]]` with every segment non-empty.

use std::sync::{PoisonError, RwLock};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::auth::{AuthScope, Credentials};
use crate::codec::{self, MEDIA_TYPE};
use crate::config::ClientConfig;
use crate::error::CimiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::types::{
    CimiResource, Machine, MachineAction, MachineCreate, Volume, MODEL_MACHINES,
};

/// Header carried by every request.
pub const SPEC_VERSION_HEADER: &str = "CIMI-Specification-Version";
/// Protocol version this client speaks.
pub const SPEC_VERSION: &str = "1.0";

/// Everything outside RFC 3986 `unreserved` is escaped in path segments.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Synchronous client for one CIMI endpoint.
///
/// Credentials sit behind a lock, so one client can be shared across threads
/// and `set_credentials` affects every request dispatched after it returns.
/// Requests already in flight keep the credentials they were built with.
#[derive(Debug)]
pub struct CimiClient<T = UreqTransport> {
    base_url: String,
    scope: AuthScope,
    credentials: RwLock<Option<Credentials>>,
    transport: T,
}

impl CimiClient<UreqTransport> {
    /// Client over the default pooled transport.
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, CimiError> {
        Self::with_transport(base_url, Some(credentials), UreqTransport::new())
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, CimiError> {
        Self::with_transport(
            &config.base_url,
            config.credentials.clone(),
            UreqTransport::with_timeout(config.timeout()),
        )
    }
}

impl<T: Transport> CimiClient<T> {
    pub fn with_transport(
        base_url: &str,
        credentials: Option<Credentials>,
        transport: T,
    ) -> Result<Self, CimiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let parsed =
            Url::parse(&base_url).map_err(|e| CimiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CimiError::InvalidUrl(format!(
                "{base_url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }
        let scope = AuthScope::from_url(&parsed)?;
        if let Some(credentials) = &credentials {
            credentials.authorization()?;
        }

        Ok(Self {
            base_url,
            scope,
            credentials: RwLock::new(credentials),
            transport,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn scope(&self) -> &AuthScope {
        &self.scope
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replace the credentials used by subsequent requests.
    pub fn set_credentials(&self, credentials: Credentials) -> Result<(), CimiError> {
        credentials.authorization()?;
        debug!(credentials = %credentials.describe(), "replacing CIMI credentials");
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credentials);
        Ok(())
    }

    /// Send subsequent requests without an `Authorization` header.
    pub fn clear_credentials(&self) {
        debug!("clearing CIMI credentials");
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Drop the client and its transport.
    ///
    /// Pooled connections are released only when the last handle to the
    /// transport goes away. A `UreqTransport` cloned out of `transport()`
    /// shares the same pool and keeps it alive after `shutdown`.
    pub fn shutdown(self) {
        debug!(base_url = %self.base_url, "shutting down CIMI client");
    }

    // -----------------------------------------------------------------------
    // URLs
    // -----------------------------------------------------------------------

    /// `<base>/<model>`
    pub fn model_url(&self, model: &str) -> Result<String, CimiError> {
        Ok(format!("{}/{}", self.base_url, encode_segment("model", model)?))
    }

    /// `<base>/<model>/<id>`
    pub fn resource_url(&self, model: &str, id: &str) -> Result<String, CimiError> {
        Ok(format!("{}/{}", self.model_url(model)?, encode_segment("id", id)?))
    }

    /// `<base>/<model>/<id>/<action>`
    pub fn action_url(&self, model: &str, id: &str, action: &str) -> Result<String, CimiError> {
        Ok(format!(
            "{}/{}",
            self.resource_url(model, id)?,
            encode_segment("action", action)?
        ))
    }

    /// Absolute URLs pass through; anything else is a path under the base URL.
    pub fn resolve_url(&self, url: &str) -> String {
        if Url::parse(url).is_ok() {
            return url.to_string();
        }
        format!("{}/{}", self.base_url, url.trim_start_matches('/'))
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Build the request `dispatch` would send, without sending it.
    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&B>,
    ) -> Result<HttpRequest, CimiError> {
        let url = self.resolve_url(url);
        let mut headers = vec![
            (SPEC_VERSION_HEADER.to_string(), SPEC_VERSION.to_string()),
            ("accept".to_string(), MEDIA_TYPE.to_string()),
        ];

        let body = body.map(codec::encode).transpose()?;
        if body.is_some() {
            headers.push(("content-type".to_string(), MEDIA_TYPE.to_string()));
        }
        if let Some(authorization) = self.authorization_for(&url)? {
            headers.push(("authorization".to_string(), authorization));
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Send one request and return the response without inspecting its
    /// status. Decode it with `HttpResponse::entity` or `collection`.
    pub fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&B>,
    ) -> Result<HttpResponse, CimiError> {
        let request = self.build_request(method, url, body)?;
        debug!(
            method = %request.method,
            url = %request.url,
            has_body = request.body.is_some(),
            authenticated = request.header("authorization").is_some(),
            "dispatching CIMI request"
        );
        let response = self.transport.execute(&request)?;
        debug!(status = response.status, url = %request.url, "CIMI response received");
        Ok(response)
    }

    /// `dispatch` without a request body.
    pub fn dispatch_empty(&self, method: HttpMethod, url: &str) -> Result<HttpResponse, CimiError> {
        self.dispatch::<()>(method, url, None)
    }

    fn authorization_for(&self, url: &str) -> Result<Option<String>, CimiError> {
        if !self.scope.matches(url) {
            return Ok(None);
        }
        let credentials = self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        credentials.as_ref().map(Credentials::authorization).transpose()
    }

    /// Dispatch, reject non-2xx statuses, then decode with `decode`.
    fn fetch<B, R, F>(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&B>,
        decode: F,
    ) -> Result<R, CimiError>
    where
        B: Serialize + ?Sized,
        F: FnOnce(HttpResponse) -> Result<R, CimiError>,
    {
        let response = self.dispatch(method, url, body)?.error_for_status()?;
        decode(response)
    }

    // -----------------------------------------------------------------------
    // URL-level typed operations
    // -----------------------------------------------------------------------

    /// GET a collection and keep only the members that are an `R`.
    pub fn get_model_collection<R: CimiResource>(&self, url: &str) -> Result<Vec<R>, CimiError> {
        self.fetch(HttpMethod::Get, url, None::<&()>, |response| {
            response.collection()?.members_of()
        })
    }

    pub fn get_model<R: DeserializeOwned>(&self, url: &str) -> Result<R, CimiError> {
        self.fetch(HttpMethod::Get, url, None::<&()>, |response| response.entity())
    }

    pub fn post_model<R, B>(&self, url: &str, body: &B) -> Result<R, CimiError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.fetch(HttpMethod::Post, url, Some(body), |response| response.entity())
    }

    pub fn put_model<R, B>(&self, url: &str, body: &B) -> Result<R, CimiError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.fetch(HttpMethod::Put, url, Some(body), |response| response.entity())
    }

    /// DELETE a resource. `Ok(true)` only for status 200; other statuses are
    /// `Ok(false)`, transport failures are errors.
    pub fn delete_model(&self, url: &str) -> Result<bool, CimiError> {
        Ok(self.dispatch_empty(HttpMethod::Delete, url)?.status == 200)
    }

    // -----------------------------------------------------------------------
    // Resource-level CRUD
    // -----------------------------------------------------------------------

    pub fn list<R: CimiResource>(&self) -> Result<Vec<R>, CimiError> {
        self.get_model_collection(&self.model_url(R::MODEL)?)
    }

    pub fn get<R: CimiResource>(&self, id: &str) -> Result<R, CimiError> {
        self.get_model(&self.resource_url(R::MODEL, id)?)
    }

    pub fn create<R, B>(&self, body: &B) -> Result<R, CimiError>
    where
        R: CimiResource,
        B: Serialize + ?Sized,
    {
        self.post_model(&self.model_url(R::MODEL)?, body)
    }

    /// PUT the full entity to the URL named by its `name`.
    pub fn update<R: CimiResource>(&self, entity: &R) -> Result<R, CimiError> {
        self.put_model(&self.resource_url(R::MODEL, entity.name())?, entity)
    }

    pub fn delete<R: CimiResource>(&self, id: &str) -> Result<bool, CimiError> {
        self.delete_model(&self.resource_url(R::MODEL, id)?)
    }

    // -----------------------------------------------------------------------
    // Machines
    // -----------------------------------------------------------------------

    pub fn machines(&self) -> Result<Vec<Machine>, CimiError> {
        self.list()
    }

    pub fn machine(&self, name: &str) -> Result<Machine, CimiError> {
        self.get(name)
    }

    pub fn create_machine(&self, machine_create: &MachineCreate) -> Result<Machine, CimiError> {
        self.create(machine_create)
    }

    pub fn update_machine(&self, machine: &Machine) -> Result<Machine, CimiError> {
        self.update(machine)
    }

    pub fn delete_machine(&self, name: &str) -> Result<bool, CimiError> {
        self.delete::<Machine>(name)
    }

    /// Invoke a machine operation. `Ok(true)` for any 2xx status.
    pub fn machine_action(&self, name: &str, action: MachineAction) -> Result<bool, CimiError> {
        let url = self.action_url(MODEL_MACHINES, name, action.as_str())?;
        let response = self.dispatch(HttpMethod::Post, &url, Some(&action.to_action()))?;
        Ok(response.is_success())
    }

    // -----------------------------------------------------------------------
    // Volumes
    // -----------------------------------------------------------------------

    pub fn volumes(&self) -> Result<Vec<Volume>, CimiError> {
        self.list()
    }

    pub fn volume(&self, name: &str) -> Result<Volume, CimiError> {
        self.get(name)
    }

    pub fn delete_volume(&self, name: &str) -> Result<bool, CimiError> {
        self.delete::<Volume>(name)
    }
}

fn encode_segment(what: &str, segment: &str) -> Result<String, CimiError> {
    // Dot segments would be collapsed by URL normalization.
    match segment {
        "" => Err(CimiError::InvalidUrl(format!("empty {what} path segment"))),
        "." => Ok("%2E".to_string()),
        ".." => Ok("%2E%2E".to_string()),
        _ => Ok(utf8_percent_encode(segment, PATH_SEGMENT).to_string()),
    }
}
