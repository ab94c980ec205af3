// src/endpoint.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Fixed endpoint resolution.
//!
//! The SDK normally derives the endpoint from region and bucket. Here the
//! answer is always the configured host, addressed path-style so the SDK
//! never rewrites the hostname, with a signing region defaulted when the
//! caller gives none.

use std::collections::HashMap;

use aws_sdk_s3::config::endpoint::{Endpoint, EndpointFuture, Params, ResolveEndpoint};
use aws_smithy_types::Document;
use tracing::trace;

use crate::constants::{DEFAULT_REGION, S3_SERVICE_ID};
use crate::error::EndpointError;

/// Outcome of an endpoint lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub url: String,
    /// Host must be used verbatim: no bucket-in-host or region rewriting.
    pub hostname_immutable: bool,
    pub signing_region: String,
}

/// Endpoint lookup for a (service, region) pair.
pub trait EndpointResolver: Send + Sync + std::fmt::Debug {
    fn resolve(&self, service: &str, region: Option<&str>) -> Result<ResolvedEndpoint, EndpointError>;
}

/// Always answers with one URL, and only for the S3 service.
#[derive(Debug, Clone)]
pub struct FixedEndpointResolver {
    url: String,
    default_region: String,
}

impl FixedEndpointResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            default_region: DEFAULT_REGION.to_string(),
        }
    }

    /// Region used when a lookup arrives without one.
    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = region.into();
        self
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }
}

impl EndpointResolver for FixedEndpointResolver {
    fn resolve(&self, service: &str, region: Option<&str>) -> Result<ResolvedEndpoint, EndpointError> {
        if service != S3_SERVICE_ID {
            return Err(EndpointError::UnknownEndpoint(service.to_string()));
        }
        let signing_region = region
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.default_region)
            .to_string();
        Ok(ResolvedEndpoint {
            url: self.url.clone(),
            hostname_immutable: true,
            signing_region,
        })
    }
}

/// Plugs an [`EndpointResolver`] into the S3 client's endpoint hook.
#[derive(Debug)]
pub struct S3EndpointAdapter<R> {
    resolver: R,
}

impl<R: EndpointResolver> S3EndpointAdapter<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Path-style endpoint for `bucket`, plus the SigV4 auth scheme.
    pub fn endpoint_for(&self, bucket: Option<&str>, region: Option<&str>) -> Result<Endpoint, EndpointError> {
        let resolved = self.resolver.resolve(S3_SERVICE_ID, region)?;
        if !resolved.url.starts_with("http://") && !resolved.url.starts_with("https://") {
            return Err(EndpointError::InvalidUrl(resolved.url));
        }
        let url = match bucket {
            Some(b) if !b.is_empty() && resolved.hostname_immutable => format!("{}/{}", resolved.url, b),
            _ => resolved.url.clone(),
        };
        trace!(%url, region = %resolved.signing_region, "resolved endpoint");
        Ok(Endpoint::builder()
            .url(url)
            .property("authSchemes", vec![sigv4_scheme(&resolved.signing_region)])
            .build())
    }
}

fn sigv4_scheme(region: &str) -> Document {
    let mut scheme: HashMap<String, Document> = HashMap::new();
    scheme.insert("name".into(), "sigv4".into());
    scheme.insert("signingName".into(), S3_SERVICE_ID.into());
    scheme.insert("signingRegion".into(), region.into());
    scheme.insert("disableDoubleEncoding".into(), true.into());
    Document::Object(scheme)
}

impl<R: EndpointResolver> ResolveEndpoint for S3EndpointAdapter<R> {
    fn resolve_endpoint<'a>(&'a self, params: &'a Params) -> EndpointFuture<'a> {
        EndpointFuture::ready(
            self.endpoint_for(params.bucket(), params.region())
                .map_err(Into::into),
        )
    }
}
