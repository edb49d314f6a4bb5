//! Definition Engine client
//!
//! Thin wrapper over the generated gRPC client: lazy channel setup with
//! HTTP/2 keepalive, and the `x-avap-auth` metadata header on every call.

use std::time::Duration;

use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::catalog::proto::definition_engine_client::DefinitionEngineClient;
use crate::catalog::proto::{CatalogResponse, CommandRequest, CommandResponse, Empty};
use crate::catalog::types::CatalogError;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);
const GET_COMMAND_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct EngineClient {
    channel: Channel,
    auth: AsciiMetadataValue,
}

impl EngineClient {
    /// Set up a lazily-connected channel to the Definition Engine.
    pub fn new(host: &str, port: u16, auth_token: &str) -> Result<Self, CatalogError> {
        let endpoint = Endpoint::from_shared(format!("http://{}:{}", host, port))?
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true);
        let channel = endpoint.connect_lazy();
        let auth = auth_token
            .parse::<AsciiMetadataValue>()
            .map_err(|_| CatalogError::Transport(tonic::Status::internal("invalid auth token")))?;
        Ok(Self { channel, auth })
    }

    fn authed<T>(&self, message: T) -> Request<T> {
        let mut req = Request::new(message);
        req.metadata_mut().insert("x-avap-auth", self.auth.clone());
        req
    }

    /// Fetch the entire command catalog.
    pub async fn sync_catalog(&self) -> Result<CatalogResponse, tonic::Status> {
        let mut client = DefinitionEngineClient::new(self.channel.clone());
        Ok(client.sync_catalog(self.authed(Empty {})).await?.into_inner())
    }

    /// Point lookup of a single command definition.
    pub async fn get_command(&self, name: &str) -> Result<CommandResponse, tonic::Status> {
        let mut client = DefinitionEngineClient::new(self.channel.clone());
        let mut req = self.authed(CommandRequest {
            name: name.to_string(),
        });
        req.set_timeout(GET_COMMAND_DEADLINE);
        Ok(client.get_command(req).await?.into_inner())
    }
}
