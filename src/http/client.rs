// src/http/client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// HTTP client for the AWS SDK built on the pinned dialer

use std::sync::Arc;

use aws_smithy_runtime_api::client::http::{
    HttpClient, HttpConnector, HttpConnectorFuture, HttpConnectorSettings, SharedHttpClient,
    SharedHttpConnector,
};
use aws_smithy_runtime_api::client::orchestrator::{HttpRequest, HttpResponse};
use aws_smithy_runtime_api::client::result::ConnectorError;
use aws_smithy_runtime_api::client::runtime_components::RuntimeComponents;
use aws_smithy_types::body::SdkBody;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::constants::MIN_HTTP1_READ_BUFFER;
use crate::endpoint::{FixedEndpointResolver, S3EndpointAdapter};
use crate::error::ConfigError;
use crate::http::dialer::{Dialer, PinnedConnector, dialer_for};

/// Assembles everything the SDK needs to talk to the pinned endpoint.
#[derive(Debug, Clone)]
pub struct TransportFactory {
    config: ConnectionConfig,
    dialer: Arc<dyn Dialer>,
}

impl TransportFactory {
    /// Build the dialer `config` calls for (plain or TLS).
    pub fn new(config: &ConnectionConfig) -> Result<Self, ConfigError> {
        let dialer = dialer_for(config)?;
        Ok(Self::with_dialer(config, dialer))
    }

    /// Use a caller-supplied dialer instead.
    pub fn with_dialer(config: &ConnectionConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            config: config.clone(),
            dialer,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn dialer(&self) -> &Arc<dyn Dialer> {
        &self.dialer
    }

    /// The pooled HTTP client handed to the SDK.
    pub fn http_client(&self) -> SharedHttpClient {
        let read_buf = self.config.buffer_size.max(MIN_HTTP1_READ_BUFFER);
        let mut builder = HyperClient::builder(TokioExecutor::new());
        builder
            .pool_idle_timeout(None::<std::time::Duration>)
            .http1_read_buf_exact_size(read_buf);
        let client = builder.build(PinnedConnector::new(self.dialer.clone()));

        debug!(
            address = self.dialer.address(),
            tls = self.config.use_tls,
            read_buf,
            "built pinned HTTP client"
        );
        SharedHttpClient::new(PinnedHttpClient {
            connector: PinnedHttpConnector { client },
        })
    }

    /// Endpoint hook that always answers with the configured host.
    pub fn endpoint_resolver(&self) -> S3EndpointAdapter<FixedEndpointResolver> {
        let mut resolver = FixedEndpointResolver::new(&self.config.endpoint_url);
        if let Some(region) = &self.config.signing_region {
            resolver = resolver.with_default_region(region);
        }
        S3EndpointAdapter::new(resolver)
    }
}

#[derive(Debug, Clone)]
struct PinnedHttpClient {
    connector: PinnedHttpConnector,
}

impl HttpClient for PinnedHttpClient {
    // Connect/read timeouts from the SDK are ignored; deadlines live in the dialer.
    fn http_connector(
        &self,
        _settings: &HttpConnectorSettings,
        _components: &RuntimeComponents,
    ) -> SharedHttpConnector {
        SharedHttpConnector::new(self.connector.clone())
    }
}

#[derive(Debug, Clone)]
struct PinnedHttpConnector {
    client: HyperClient<PinnedConnector, SdkBody>,
}

impl HttpConnector for PinnedHttpConnector {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        let request = match request.try_into_http1x() {
            Ok(request) => request,
            Err(err) => return HttpConnectorFuture::ready(Err(ConnectorError::user(err.into()))),
        };
        let client = self.client.clone();
        HttpConnectorFuture::new(async move {
            let response = client.request(request).await.map_err(|err| {
                if err.is_connect() {
                    ConnectorError::io(err.into())
                } else {
                    ConnectorError::other(err.into(), None)
                }
            })?;
            let response = response.map(SdkBody::from_body_1_x);
            HttpResponse::try_from(response).map_err(|err| ConnectorError::other(err.into(), None))
        })
    }
}
