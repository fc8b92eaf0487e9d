//! Synchronous client for the CIMI (Cloud Infrastructure Management
//! Interface) REST API.
//!
//! # Overview
//! `CimiClient` maps typed CRUD operations on CIMI resources (machines,
//! volumes) onto single HTTP round trips. Every request carries
//! `CIMI-Specification-Version: 1.0` and negotiates one media type.
//!
//! # Design
//! - The HTTP round trip goes through the `Transport` trait; `UreqTransport`
//!   is the default, tests substitute their own.
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`),
//!   and response payloads are decoded lazily into whatever type the caller
//!   asks for.
//! - Collection members are discriminated by their `resourceURI` tag; a typed
//!   list decodes only the members tagged as that type.
//! - The client is consumed by `shutdown`, and dropping it releases the
//!   transport on every other path.

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use auth::{AuthScope, Credentials, SecureString};
pub use client::{CimiClient, SPEC_VERSION, SPEC_VERSION_HEADER};
pub use config::ClientConfig;
pub use error::CimiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use types::{
    Action, CimiResource, Collection, Href, Machine, MachineAction, MachineCreate, MachineState,
    MachineTemplate, Volume, MODEL_MACHINES, MODEL_VOLUMES,
};
