//! Netdisk file provider implementation.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use fsgate_common::{
    resolve, Content, Data, DataType, Error, Exhausted, File, RequestFailure, Result,
    RetryConfig, RetryExecutor,
};

use super::client::{
    backend_error, Expect, HttpMethod, HttpPcsTransport, PcsCall, PcsFile, PcsFileList,
    PcsResponse, PcsTransport, Upload, PCS_FILE_URL,
};
use crate::provider::{FileProvider, Response};
use crate::request::{DuplicatePolicy, FileRequest, Method};

/// Netdisk provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetdiskConfig {
    /// PCS file endpoint.
    pub api_url: String,
    /// Retries per request, overridable per request with `extra.retry`.
    pub retry: u32,
    /// Backoff step; the n-th retry waits n times this.
    pub retry_delay_ms: u64,
    /// Retries for the metadata fetch that follows read and move.
    pub meta_retry: u32,
    pub meta_retry_delay_ms: u64,
    /// Wait before fetching metadata of a moved file.
    pub move_settle_ms: u64,
}

impl Default for NetdiskConfig {
    fn default() -> Self {
        Self {
            api_url: PCS_FILE_URL.to_string(),
            retry: 3,
            retry_delay_ms: 1000,
            meta_retry: 3,
            meta_retry_delay_ms: 200,
            move_settle_ms: 200,
        }
    }
}

/// Netdisk storage provider.
///
/// Authenticates with the token of the request's acting user.
/// ACL methods are not supported by the backend.
pub struct NetdiskProvider {
    config: RwLock<NetdiskConfig>,
    transport: Arc<dyn PcsTransport>,
}

impl NetdiskProvider {
    /// Name reported on files served by this provider.
    pub const NAME: &'static str = "netdisk";

    /// Create a provider talking HTTPS to the PCS API.
    pub fn new(config: NetdiskConfig) -> Result<Self> {
        Ok(Self::with_transport(config, Arc::new(HttpPcsTransport::new()?)))
    }

    /// Create a provider over a custom transport.
    pub fn with_transport(config: NetdiskConfig, transport: Arc<dyn PcsTransport>) -> Self {
        Self {
            config: RwLock::new(config),
            transport,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> NetdiskConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn timestamp(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
    }

    /// Convert a PCS record into a File.
    fn to_file(record: &PcsFile) -> File {
        let mut file = File::from_path_info(
            resolve(&record.path),
            Self::timestamp(record.ctime),
            Self::timestamp(record.mtime),
        )
        .with_size(record.size)
        .with_provider(Self::NAME);
        file.is_dir = record.isdir != 0;
        file
    }

    fn parse<T: serde::de::DeserializeOwned>(response: PcsResponse) -> Result<T> {
        match response {
            PcsResponse::Json(value) => Ok(serde_json::from_value(value)?),
            other => Err(Error::Serialization(format!(
                "Expected a JSON response, got {:?}",
                other
            ))),
        }
    }

    fn param(key: &str, value: impl Into<String>) -> (String, String) {
        (key.to_string(), value.into())
    }

    /// Translate a request into its primary PCS call.
    fn build_call(
        &self,
        request: &FileRequest,
        token: &str,
        config: &NetdiskConfig,
    ) -> Result<PcsCall> {
        let path = resolve(&request.path).path;
        let mut call = PcsCall {
            url: config.api_url.clone(),
            http_method: HttpMethod::Get,
            params: Vec::new(),
            access_token: token.to_string(),
            upload: None,
            expect: Expect::Json,
        };

        match request.method {
            Method::ReadAcl | Method::WriteAcl => {
                return Err(Error::NotSupported(format!(
                    "Not supported file request: {}",
                    request.method
                )));
            }
            Method::Read => {
                call.params.push(Self::param("method", "download"));
                call.expect = match request.data_type {
                    DataType::Blob => Expect::Binary,
                    DataType::Json => Expect::Json,
                    DataType::Text | DataType::Unknown => Expect::Text,
                };
            }
            Method::Write => {
                let data = request.data.as_ref().ok_or_else(|| {
                    Error::InvalidInput("Write request carries no data".to_string())
                })?;
                call.http_method = HttpMethod::Post;
                call.params.push(Self::param("method", "upload"));
                // The backend cannot refuse a duplicate upload; anything but
                // overwrite keeps both copies.
                let ondup = match request.duplicate_policy {
                    DuplicatePolicy::Overwrite => "overwrite",
                    DuplicatePolicy::Rename | DuplicatePolicy::Fail => "newcopy",
                };
                call.params.push(Self::param("ondup", ondup));
                call.upload = Some(Upload {
                    filename: resolve(&path).filename.unwrap_or_default(),
                    content_type: match data.data_type {
                        DataType::Blob => "application/octet-stream".to_string(),
                        _ => "text/plain".to_string(),
                    },
                    bytes: data.content.to_bytes(),
                });
            }
            Method::List => call.params.push(Self::param("method", "list")),
            Method::Mkdir => {
                call.http_method = HttpMethod::Post;
                call.params.push(Self::param("method", "mkdir"));
            }
            Method::Move => {
                let to = request.new_path.as_deref().ok_or_else(|| {
                    Error::InvalidInput("Move request carries no new path".to_string())
                })?;
                call.http_method = HttpMethod::Post;
                call.params.push(Self::param("method", "move"));
                call.params.push(Self::param("to", resolve(to).path));
                if request.duplicate_policy == DuplicatePolicy::Rename {
                    call.params.push(Self::param("ondup", "newcopy"));
                }
            }
            Method::Delete => {
                call.http_method = HttpMethod::Post;
                call.params.push(Self::param("method", "delete"));
            }
        }

        if request.method == Method::Move {
            call.params.insert(1, Self::param("from", path));
        } else {
            call.params.insert(1, Self::param("path", path));
        }

        Ok(call)
    }

    /// Send a call with retries; exhausted transient failures are enriched
    /// with the request context.
    async fn send(
        &self,
        request: &FileRequest,
        method: &str,
        call: &PcsCall,
        retry: RetryConfig,
    ) -> Result<PcsResponse> {
        let inspect_body = request.method != Method::Read || method != request.method.as_str();

        let result = RetryExecutor::new(retry)
            .execute_with_condition(
                |attempt| {
                    let call = call.clone();
                    async move {
                        debug!("netdisk: {} {} (attempt {})", method, request.path, attempt);
                        let response = self.transport.send(call).await?;
                        if inspect_body {
                            if let PcsResponse::Json(body) = &response {
                                if let Some(error) = backend_error(body, None) {
                                    return Err(Error::Remote(error));
                                }
                            }
                        }
                        Ok(response)
                    }
                },
                Error::is_transient,
            )
            .await;

        result.map_err(|exhausted| Self::enrich(request, method, call, exhausted))
    }

    fn enrich(request: &FileRequest, method: &str, call: &PcsCall, exhausted: Exhausted) -> Error {
        if !exhausted.error.is_transient() {
            return exhausted.error;
        }
        Error::RemoteRequestFailed(Box::new(RequestFailure {
            method: method.to_string(),
            path: request.path.clone(),
            user: request.username().map(str::to_string),
            params: call.params.clone(),
            data_type: (request.method == Method::Read).then(|| request.data_type.to_string()),
            attempts: exhausted.attempts,
            cause: exhausted.error,
        }))
    }

    /// Fetch metadata of `path`.
    async fn meta(
        &self,
        request: &FileRequest,
        path: &str,
        token: &str,
        config: &NetdiskConfig,
    ) -> Result<File> {
        let call = PcsCall {
            url: config.api_url.clone(),
            http_method: HttpMethod::Get,
            params: vec![Self::param("method", "meta"), Self::param("path", path)],
            access_token: token.to_string(),
            upload: None,
            expect: Expect::Json,
        };
        let retry = RetryConfig::new(config.meta_retry)
            .with_delay_step(Duration::from_millis(config.meta_retry_delay_ms));

        let list: PcsFileList = Self::parse(self.send(request, "meta", &call, retry).await?)?;
        list.list
            .first()
            .map(Self::to_file)
            .ok_or_else(|| Error::NotFound(format!("No metadata for {}", path)))
    }

    fn content(response: PcsResponse) -> Data {
        match response {
            PcsResponse::Text(text) => Data::new(text),
            PcsResponse::Binary(bytes) => Data::new(bytes),
            PcsResponse::Json(value) => Data::new(Content::Json(value)),
        }
    }

    fn moved_to(response: &Value) -> Option<String> {
        response
            .pointer("/extra/list/0/to")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[async_trait]
impl FileProvider for NetdiskProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn init(&self, config: Value) -> Result<()> {
        let config: NetdiskConfig = serde_json::from_value(config)
            .map_err(|e| Error::InvalidInput(format!("Invalid netdisk config: {}", e)))?;
        info!("netdisk: configured for {}", config.api_url);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    async fn handle(&self, request: FileRequest) -> Result<Response> {
        let token = request
            .token()
            .ok_or_else(|| Error::NotAuthorized("Not authorized".to_string()))?
            .to_string();
        let config = self.config();

        let call = self.build_call(&request, &token, &config)?;
        let retry = RetryConfig::new(request.extra_u32("retry").unwrap_or(config.retry))
            .with_delay_step(Duration::from_millis(config.retry_delay_ms));

        let response = self
            .send(&request, request.method.as_str(), &call, retry)
            .await?;

        match request.method {
            Method::Read => {
                let path = resolve(&request.path).path;
                let file = self.meta(&request, &path, &token, &config).await?;
                Ok(Response::File(file.with_data(Self::content(response))))
            }
            Method::Write => {
                let record: PcsFile = Self::parse(response)?;
                let mut file = Self::to_file(&record);
                file.data = request.data;
                Ok(Response::File(file))
            }
            Method::List => {
                let list: PcsFileList = Self::parse(response)?;
                Ok(Response::Files(list.list.iter().map(Self::to_file).collect()))
            }
            Method::Mkdir => {
                let record: PcsFile = Self::parse(response)?;
                Ok(Response::File(Self::to_file(&record).directory()))
            }
            Method::Move => {
                let target = match &response {
                    PcsResponse::Json(body) => Self::moved_to(body),
                    _ => None,
                }
                .or_else(|| call.param("to").map(str::to_string))
                .unwrap_or_default();

                // The backend may not list the destination right away.
                tokio::time::sleep(Duration::from_millis(config.move_settle_ms)).await;
                let file = self.meta(&request, &target, &token, &config).await?;
                Ok(Response::File(file))
            }
            Method::Delete => Ok(Response::File(
                File::new(&request.path).with_provider(Self::NAME),
            )),
            Method::ReadAcl | Method::WriteAcl => Err(Error::NotSupported(format!(
                "Not supported file request: {}",
                request.method
            ))),
        }
    }
}
