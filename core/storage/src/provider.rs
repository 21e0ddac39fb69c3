//! File provider trait definition.

use async_trait::async_trait;
use serde_json::Value;

use fsgate_common::{Acl, Error, File, Result};

use crate::request::{FileRequest, Method};

/// The result of handling a request, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// read, write, move, delete and mkdir.
    File(File),
    /// list.
    Files(Vec<File>),
    /// readAcl and writeAcl.
    Acl(Vec<Acl>),
}

impl Response {
    fn shape(&self) -> &'static str {
        match self {
            Response::File(_) => "file",
            Response::Files(_) => "file list",
            Response::Acl(_) => "acl list",
        }
    }

    /// Narrow to a single file.
    pub fn into_file(self) -> Result<File> {
        match self {
            Response::File(file) => Ok(file),
            other => Err(Error::InvalidInput(format!(
                "Provider returned a {} where a file was expected",
                other.shape()
            ))),
        }
    }

    /// Narrow to a file list.
    pub fn into_files(self) -> Result<Vec<File>> {
        match self {
            Response::Files(files) => Ok(files),
            other => Err(Error::InvalidInput(format!(
                "Provider returned a {} where a file list was expected",
                other.shape()
            ))),
        }
    }

    /// Narrow to an ACL list.
    pub fn into_acl(self) -> Result<Vec<Acl>> {
        match self {
            Response::Acl(acl) => Ok(acl),
            other => Err(Error::InvalidInput(format!(
                "Provider returned a {} where an acl list was expected",
                other.shape()
            ))),
        }
    }

    /// Whether this shape is what `method` is expected to produce.
    pub fn matches(&self, method: Method) -> bool {
        matches!(
            (self, method),
            (Response::Files(_), Method::List)
                | (Response::Acl(_), Method::ReadAcl | Method::WriteAcl)
                | (
                    Response::File(_),
                    Method::Read | Method::Write | Method::Move | Method::Delete | Method::Mkdir
                )
        )
    }
}

/// Storage backend that handles file requests.
///
/// Implementations must reject methods they do not support with
/// [`Error::NotSupported`] and handle their own authentication against
/// the token carried by the request's user.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Get the provider name (e.g., "netdisk", "memory").
    fn name(&self) -> &str;

    /// Initialize the provider with backend-specific configuration.
    ///
    /// Calling it again re-applies the configuration.
    async fn init(&self, _config: Value) -> Result<()> {
        Ok(())
    }

    /// Handle one request.
    ///
    /// # Returns
    /// - `Response::Files` for list
    /// - `Response::Acl` for readAcl and writeAcl
    /// - `Response::File` for everything else
    async fn handle(&self, request: FileRequest) -> Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_narrowing() {
        let file = File::new("/a.txt");
        assert_eq!(
            Response::File(file.clone()).into_file().unwrap().path,
            "/a.txt"
        );
        assert!(Response::File(file.clone()).into_files().is_err());
        assert!(Response::Files(vec![file]).into_acl().is_err());
        assert!(Response::Acl(vec![]).into_acl().unwrap().is_empty());
    }

    #[test]
    fn test_response_matches_method() {
        let file = Response::File(File::new("/a.txt"));
        assert!(file.matches(Method::Read));
        assert!(file.matches(Method::Mkdir));
        assert!(!file.matches(Method::List));
        assert!(Response::Files(vec![]).matches(Method::List));
        assert!(Response::Acl(vec![]).matches(Method::WriteAcl));
    }
}
