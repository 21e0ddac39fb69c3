//! The request model handed to providers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use fsgate_common::{Access, Data, DataType, User};

/// The eight file operations a provider can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    Read,
    Write,
    List,
    Move,
    Delete,
    Mkdir,
    ReadAcl,
    WriteAcl,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::Read,
        Method::Write,
        Method::List,
        Method::Move,
        Method::Delete,
        Method::Mkdir,
        Method::ReadAcl,
        Method::WriteAcl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Read => "read",
            Method::Write => "write",
            Method::List => "list",
            Method::Move => "move",
            Method::Delete => "delete",
            Method::Mkdir => "mkdir",
            Method::ReadAcl => "readAcl",
            Method::WriteAcl => "writeAcl",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a write or move targets an existing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Refuse the operation.
    #[default]
    Fail,
    /// Replace the existing entry.
    Overwrite,
    /// Keep both; the provider picks a new name.
    Rename,
}

/// Requested rights per username, as carried by a `writeAcl` request.
pub type AclMap = BTreeMap<String, Access>;

/// One file operation, ready to be handled by a provider.
#[derive(Debug, Clone)]
pub struct FileRequest {
    /// Target path, as supplied by the caller.
    pub path: String,
    pub method: Method,
    /// Acting user; `None` for anonymous access.
    pub user: Option<User>,
    pub duplicate_policy: DuplicatePolicy,
    /// Destination of a move.
    pub new_path: Option<String>,
    /// Rights to apply for `writeAcl`.
    pub acl: Option<AclMap>,
    /// Provider-specific options passed through untouched.
    pub extra: Map<String, Value>,
    /// How a read should decode the content.
    pub data_type: DataType,
    /// Payload of a write.
    pub data: Option<Data>,
}

impl FileRequest {
    /// Create a request with default policy, text data type and no payload.
    pub fn new(path: impl Into<String>, method: Method, user: Option<User>) -> Self {
        Self {
            path: path.into(),
            method,
            user,
            duplicate_policy: DuplicatePolicy::default(),
            new_path: None,
            acl: None,
            extra: Map::new(),
            data_type: DataType::default(),
            data: None,
        }
    }

    /// Session token of the acting user, if any.
    pub fn token(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.token.as_deref())
    }

    /// Username of the acting user, if any.
    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.username.as_str())
    }

    /// Read an unsigned integer from the pass-through options.
    ///
    /// Accepts JSON numbers and numeric strings.
    pub fn extra_u32(&self, key: &str) -> Option<u32> {
        match self.extra.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request = FileRequest::new("/a.txt", Method::Read, None);
        assert_eq!(request.duplicate_policy, DuplicatePolicy::Fail);
        assert_eq!(request.data_type, DataType::Text);
        assert!(request.extra.is_empty());
        assert!(request.token().is_none());
    }

    #[test]
    fn test_extra_u32() {
        let mut request = FileRequest::new("/a.txt", Method::Read, None);
        request.extra.insert("retry".to_string(), json!(5));
        request.extra.insert("timeout".to_string(), json!("10"));
        request.extra.insert("flag".to_string(), json!(true));

        assert_eq!(request.extra_u32("retry"), Some(5));
        assert_eq!(request.extra_u32("timeout"), Some(10));
        assert_eq!(request.extra_u32("flag"), None);
        assert_eq!(request.extra_u32("missing"), None);
    }

    #[test]
    fn test_method_names() {
        let names: Vec<&str> = Method::ALL.iter().map(Method::as_str).collect();
        assert_eq!(
            names,
            ["read", "write", "list", "move", "delete", "mkdir", "readAcl", "writeAcl"]
        );
        assert_eq!(serde_json::to_string(&Method::WriteAcl).unwrap(), "\"writeAcl\"");
    }
}
