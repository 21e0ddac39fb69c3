//! Caller-facing options for a file operation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use fsgate_common::{Access, Content, Data, DataType, User};
use fsgate_storage::{AclMap, DuplicatePolicy, FileRequest, Method};

/// Options for one dispatcher call.
///
/// Only the fields relevant to the operation are consumed; everything in
/// `extra` reaches the provider untouched. Deserializing collects unknown
/// keys into `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOptions {
    pub path: String,
    /// Provider to use instead of the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Decoding of a read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    /// Payload of a write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(
        default,
        rename = "ondup",
        alias = "dupPolicy",
        skip_serializing_if = "Option::is_none"
    )]
    pub duplicate_policy: Option<DuplicatePolicy>,
    /// Destination of a move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<AclMap>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.provider = Some(name.into());
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn content(mut self, content: impl Into<Content>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = Some(policy);
        self
    }

    pub fn new_path(mut self, path: impl Into<String>) -> Self {
        self.new_path = Some(path.into());
        self
    }

    /// Grant `access` to `user`; [`Access::NONE`] revokes.
    pub fn grant(mut self, user: impl Into<String>, access: Access) -> Self {
        self.acl
            .get_or_insert_with(AclMap::new)
            .insert(user.into(), access);
        self
    }

    /// Add a pass-through option.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Build the provider request for `method`.
    ///
    /// Typed fields the method does not consume travel on in `extra` under
    /// their wire names, unless `extra` already holds that key.
    pub fn into_request(mut self, method: Method, user: Option<User>) -> FileRequest {
        let mut request = FileRequest::new(&self.path, method, user);

        match method {
            Method::Read => {
                request.data_type = self.data_type.take().unwrap_or_default();
            }
            Method::Write => {
                request.duplicate_policy = self.duplicate_policy.take().unwrap_or_default();
                request.data = self.content.take().map(Data::new);
            }
            Method::Move => {
                request.new_path = self.new_path.take();
                request.duplicate_policy = self.duplicate_policy.take().unwrap_or_default();
            }
            Method::WriteAcl => {
                request.acl = self.acl.take();
            }
            Method::List | Method::Delete | Method::Mkdir | Method::ReadAcl => {}
        }

        pass_through(&mut self.extra, "dataType", self.data_type);
        pass_through(&mut self.extra, "content", self.content);
        pass_through(&mut self.extra, "ondup", self.duplicate_policy);
        pass_through(&mut self.extra, "newPath", self.new_path);
        pass_through(&mut self.extra, "acl", self.acl);

        request.extra = self.extra;
        request
    }
}

fn pass_through<T: Serialize>(extra: &mut Map<String, Value>, key: &str, value: Option<T>) {
    let Some(value) = value else {
        return;
    };
    match serde_json::to_value(value) {
        Ok(value) => {
            extra.entry(key.to_string()).or_insert(value);
        }
        Err(e) => warn!("Dropping option '{}': {}", key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_consumes_content_and_policy() {
        let request = FileOptions::new("/docs/a.txt")
            .content("hello")
            .duplicate_policy(DuplicatePolicy::Overwrite)
            .new_path("/ignored")
            .into_request(Method::Write, None);

        assert_eq!(request.duplicate_policy, DuplicatePolicy::Overwrite);
        assert_eq!(request.data.unwrap().content, Content::Text("hello".to_string()));
        assert!(request.new_path.is_none());
        assert_eq!(request.extra["newPath"], "/ignored");
    }

    #[test]
    fn test_read_defaults_to_text() {
        let request = FileOptions::new("/a").into_request(Method::Read, None);
        assert_eq!(request.data_type, DataType::Text);

        let request = FileOptions::new("/a")
            .data_type(DataType::Blob)
            .content("ignored")
            .into_request(Method::Read, None);
        assert_eq!(request.data_type, DataType::Blob);
        assert!(request.data.is_none());
        assert_eq!(request.extra["content"], "ignored");
        assert!(!request.extra.contains_key("dataType"));
    }

    #[test]
    fn test_unused_fields_pass_through_extra() {
        let request = FileOptions::new("/a")
            .provider("memory")
            .data_type(DataType::Json)
            .duplicate_policy(DuplicatePolicy::Overwrite)
            .grant("bob", Access::READ)
            .into_request(Method::List, None);

        assert_eq!(request.extra["dataType"], "json");
        assert_eq!(request.extra["ondup"], "overwrite");
        assert_eq!(request.extra["acl"], json!({"bob": 2}));
        assert!(!request.extra.contains_key("provider"));
        assert!(!request.extra.contains_key("path"));
    }

    #[test]
    fn test_explicit_extra_wins_over_unused_field() {
        let request = FileOptions::new("/a")
            .content("typed")
            .extra("content", "explicit")
            .into_request(Method::Delete, None);

        assert_eq!(request.extra["content"], "explicit");
    }

    #[test]
    fn test_move_and_acl_fields() {
        let request = FileOptions::new("/a")
            .new_path("/b")
            .duplicate_policy(DuplicatePolicy::Rename)
            .into_request(Method::Move, None);
        assert_eq!(request.new_path.as_deref(), Some("/b"));
        assert_eq!(request.duplicate_policy, DuplicatePolicy::Rename);

        let request = FileOptions::new("/a")
            .grant("bob", Access::READ | Access::WRITE)
            .into_request(Method::WriteAcl, None);
        assert_eq!(request.acl.unwrap()["bob"], Access::READ | Access::WRITE);
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let options: FileOptions = serde_json::from_value(json!({
            "path": "/a.txt",
            "provider": "netdisk",
            "dataType": "json",
            "ondup": "rename",
            "retry": 5,
            "trace": "abc"
        }))
        .unwrap();

        assert_eq!(options.provider.as_deref(), Some("netdisk"));
        assert_eq!(options.data_type, Some(DataType::Json));
        assert_eq!(options.duplicate_policy, Some(DuplicatePolicy::Rename));
        assert_eq!(options.extra.len(), 2);

        let request = options.into_request(Method::Read, None);
        assert_eq!(request.extra_u32("retry"), Some(5));
        assert_eq!(request.extra["trace"], "abc");
    }
}
