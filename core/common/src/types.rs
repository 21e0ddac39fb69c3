//! Common types used throughout fsgate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::path::{resolve, PathInfo};

/// An authenticated user, as produced by a session manager.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Opaque session token presented to storage backends.
    pub token: Option<String>,
    pub small_image: Option<String>,
    pub large_image: Option<String>,
    /// When the session was last validated against the identity service.
    pub validated_at: DateTime<Utc>,
}

impl User {
    /// Create a user validated right now, without token or avatars.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            token: None,
            small_image: None,
            large_image: None,
            validated_at: Utc::now(),
        }
    }

    /// Attach the session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("validated_at", &self.validated_at)
            .finish()
    }
}

/// Kind of content carried by a [`Data`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Text,
    Json,
    Blob,
    Unknown,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Json => "json",
            DataType::Blob => "blob",
            DataType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw payload of a file.
///
/// Deserialized payloads are text when they are a JSON string and json
/// otherwise. `Binary` only comes from bytes handed over in Rust.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
    Json(Value),
}

impl Content {
    /// Serialize the payload to bytes for upload.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Content::Text(text) => text.as_bytes().to_vec(),
            Content::Binary(bytes) => bytes.clone(),
            Content::Json(value) => value.to_string().into_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Content::from)
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Binary(bytes)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Content::Text(text),
            other => Content::Json(other),
        }
    }
}

/// File content together with the type inferred from its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub content: Content,
    pub data_type: DataType,
}

impl Data {
    /// Wrap content, inferring its data type.
    ///
    /// Bytes are blobs, strings are text, JSON objects, arrays and null are
    /// json; numbers and booleans are unknown.
    pub fn new(content: impl Into<Content>) -> Self {
        let content = content.into();
        let data_type = match &content {
            Content::Text(_) => DataType::Text,
            Content::Binary(_) => DataType::Blob,
            Content::Json(Value::Object(_) | Value::Array(_) | Value::Null) => DataType::Json,
            Content::Json(_) => DataType::Unknown,
        };
        Self { content, data_type }
    }
}

/// A file or directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub path: String,
    pub parent_path: String,
    pub filename: Option<String>,
    pub name: Option<String>,
    pub extension: Option<String>,
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
    /// Content, attached on read and write.
    pub data: Option<Data>,
    /// Name of the provider the file came from.
    pub provider: Option<String>,
}

impl File {
    /// Create a file entry at `path`, normalized through [`resolve`].
    pub fn new(path: &str) -> Self {
        let now = Utc::now();
        Self::from_path_info(resolve(path), now, now)
    }

    /// Create an entry from already-resolved path fields.
    pub fn from_path_info(
        info: PathInfo,
        create_time: DateTime<Utc>,
        modify_time: DateTime<Utc>,
    ) -> Self {
        Self {
            path: info.path,
            parent_path: info.parent_path,
            filename: info.filename,
            name: info.name,
            extension: info.extension,
            is_dir: false,
            size: 0,
            create_time,
            modify_time,
            data: None,
            provider: None,
        }
    }

    /// Mark as directory.
    pub fn directory(mut self) -> Self {
        self.is_dir = true;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_data(mut self, data: Data) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.filename.is_none()
    }
}

/// Access rights bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Access(u32);

impl Access {
    pub const NONE: Access = Access(0);
    pub const PUBLIC: Access = Access(0x0001);
    pub const READ: Access = Access(0x0002);
    pub const WRITE: Access = Access(0x0004);
    pub const CREATE: Access = Access(0x0008);
    pub const DELETE: Access = Access(0x0010);
    pub const ACL_READ: Access = Access(0x0020);
    pub const ACL_WRITE: Access = Access(0x0040);
    /// Every right except `PUBLIC`.
    pub const ALL: Access = Access(0xfffe);

    pub const fn from_bits(bits: u32) -> Self {
        Access(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(&self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set in `self`.
    pub const fn intersects(&self, other: Access) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

impl BitOrAssign for Access {
    fn bitor_assign(&mut self, rhs: Access) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Access {
    type Output = Access;

    fn bitand(self, rhs: Access) -> Access {
        Access(self.0 & rhs.0)
    }
}

/// One access-control entry: what `user` may do with `file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acl {
    pub user: String,
    pub file: File,
    pub access: Access,
}

impl Acl {
    pub fn new(user: impl Into<String>, file: File, access: Access) -> Self {
        Self {
            user: user.into(),
            file,
            access,
        }
    }
}
