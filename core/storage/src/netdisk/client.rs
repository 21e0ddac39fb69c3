//! Transport for the netdisk PCS file API.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fsgate_common::{Error, RemoteError, Result};

/// Default PCS file endpoint.
pub const PCS_FILE_URL: &str = "https://pcs.baidu.com/rest/2.0/pcs/file";

/// Multipart boundary used for uploads.
const BOUNDARY: &str = "FsgateUploadBoundary";

/// HTTP verb of a PCS call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// How the response body should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Json,
    Text,
    Binary,
}

/// File part of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// One outbound call against the PCS API.
#[derive(Clone, PartialEq)]
pub struct PcsCall {
    pub url: String,
    pub http_method: HttpMethod,
    /// Query parameters, `method` first.
    pub params: Vec<(String, String)>,
    pub access_token: String,
    pub upload: Option<Upload>,
    pub expect: Expect,
}

impl PcsCall {
    /// Value of a query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for PcsCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcsCall")
            .field("url", &self.url)
            .field("http_method", &self.http_method)
            .field("params", &self.params)
            .field("upload", &self.upload.as_ref().map(|u| u.bytes.len()))
            .field("expect", &self.expect)
            .finish()
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum PcsResponse {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

/// File metadata record returned by the PCS API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PcsFile {
    pub path: String,
    #[serde(default)]
    pub fs_id: Option<u64>,
    #[serde(default)]
    pub size: u64,
    /// Creation time, seconds since the epoch.
    #[serde(default)]
    pub ctime: i64,
    /// Modification time, seconds since the epoch.
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub isdir: u8,
}

/// Response from `method=list` and `method=meta`.
#[derive(Debug, Deserialize)]
pub struct PcsFileList {
    #[serde(default)]
    pub list: Vec<PcsFile>,
}

/// Extract a backend-reported error from a JSON body, if present.
pub fn backend_error(body: &Value, status: Option<u16>) -> Option<RemoteError> {
    let code = body.get("error_code")?;
    if code.is_null() {
        return None;
    }
    Some(RemoteError {
        status,
        code: code.as_i64(),
        message: body
            .get("error_msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Network call abstraction for the PCS API.
#[async_trait]
pub trait PcsTransport: Send + Sync {
    /// Perform one call. Transport failures map to [`Error::Network`],
    /// HTTP failures to [`Error::Remote`].
    async fn send(&self, call: PcsCall) -> Result<PcsResponse>;
}

/// PCS transport over HTTPS.
pub struct HttpPcsTransport {
    http: Client,
}

impl HttpPcsTransport {
    /// Create a new transport.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent("fsgate/0.1")
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    fn multipart_body(upload: &Upload) -> Vec<u8> {
        let mut body = Vec::with_capacity(upload.bytes.len() + 256);

        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                upload.filename.replace('"', "")
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", upload.content_type).as_bytes());
        body.extend_from_slice(&upload.bytes);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{}--", BOUNDARY).as_bytes());

        body
    }

    async fn handle_response(response: reqwest::Response, expect: Expect) -> Result<PcsResponse> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| backend_error(&body, Some(status.as_u16())));
            return Err(Error::Remote(detail.unwrap_or(RemoteError {
                status: Some(status.as_u16()),
                code: None,
                message: if text.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    text
                },
            })));
        }

        match expect {
            Expect::Json => response
                .json()
                .await
                .map(PcsResponse::Json)
                .map_err(|e| Error::Network(format!("Failed to parse response: {}", e))),
            Expect::Text => response
                .text()
                .await
                .map(PcsResponse::Text)
                .map_err(|e| Error::Network(format!("Failed to read response: {}", e))),
            Expect::Binary => response
                .bytes()
                .await
                .map(|bytes| PcsResponse::Binary(bytes.to_vec()))
                .map_err(|e| Error::Network(format!("Failed to read response: {}", e))),
        }
    }
}

#[async_trait]
impl PcsTransport for HttpPcsTransport {
    async fn send(&self, call: PcsCall) -> Result<PcsResponse> {
        debug!("PCS {:?} {:?}", call.http_method, call.params);

        let mut request = match call.http_method {
            HttpMethod::Get => self.http.get(&call.url),
            HttpMethod::Post => self.http.post(&call.url),
        }
        .query(&call.params)
        .query(&[("access_token", call.access_token.as_str())]);

        if let Some(upload) = &call.upload {
            request = request
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Self::multipart_body(upload));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("PCS request failed: {}", e)))?;

        Self::handle_response(response, call.expect).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_error_detection() {
        let body = json!({"error_code": 31066, "error_msg": "file does not exist"});
        let error = backend_error(&body, None).unwrap();
        assert_eq!(error.code, Some(31066));
        assert_eq!(error.message, "file does not exist");

        assert!(backend_error(&json!({"list": []}), None).is_none());
        assert!(backend_error(&json!({"error_code": null}), None).is_none());
    }

    #[test]
    fn test_pcs_file_deserialization() {
        let record: PcsFile = serde_json::from_value(json!({
            "fs_id": 3528850315u64,
            "path": "/apps/kityminder/a.km",
            "ctime": 1400000000,
            "mtime": 1400000100,
            "md5": "a8f1...",
            "size": 1024,
            "isdir": 0
        }))
        .unwrap();

        assert_eq!(record.path, "/apps/kityminder/a.km");
        assert_eq!(record.size, 1024);
        assert_eq!(record.isdir, 0);

        let sparse: PcsFile = serde_json::from_value(json!({"path": "/apps/dir"})).unwrap();
        assert_eq!(sparse.size, 0);
        assert!(sparse.fs_id.is_none());
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = HttpPcsTransport::multipart_body(&Upload {
            filename: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: b"hello".to_vec(),
        });
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with(&format!("--{}\r\n", BOUNDARY)));
        assert!(text.contains("name=\"file\"; filename=\"a.txt\""));
        assert!(text.contains("Content-Type: text/plain\r\n\r\nhello\r\n"));
        assert!(text.ends_with(&format!("--{}--", BOUNDARY)));
    }

    #[test]
    fn test_call_debug_hides_token() {
        let call = PcsCall {
            url: PCS_FILE_URL.to_string(),
            http_method: HttpMethod::Get,
            params: vec![("method".to_string(), "list".to_string())],
            access_token: "secret".to_string(),
            upload: None,
            expect: Expect::Json,
        };
        assert!(!format!("{:?}", call).contains("secret"));
        assert_eq!(call.param("method"), Some("list"));
    }
}
