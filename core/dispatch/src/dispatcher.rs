//! The public file API.

use std::sync::Arc;
use tracing::debug;

use fsgate_common::{Acl, Error, File, Result};
use fsgate_session::{AnonymousSession, SessionManager};
use fsgate_storage::{Method, ProviderRegistry, Response};

use crate::options::FileOptions;

/// Routes file operations to providers on behalf of the session's user.
///
/// Every call checks the session first, then resolves the provider named
/// in the options (or the registry's current one) and hands it the
/// normalized request. Errors from either step propagate unchanged.
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    session: Arc<dyn SessionManager>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ProviderRegistry>, session: Arc<dyn SessionManager>) -> Self {
        Self { registry, session }
    }

    /// A dispatcher acting for nobody.
    pub fn anonymous(registry: Arc<ProviderRegistry>) -> Self {
        Self::new(registry, Arc::new(AnonymousSession))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &Arc<dyn SessionManager> {
        &self.session
    }

    /// Run `method` with `options` and return the provider's response.
    ///
    /// # Errors
    /// - Session check failures, including [`Error::Redirecting`]
    /// - Unknown provider or no current provider
    /// - Provider failures
    /// - A response whose shape does not fit `method`
    pub async fn execute(&self, method: Method, options: FileOptions) -> Result<Response> {
        let user = self.session.check().await?;
        let provider = self.registry.resolve(options.provider.as_deref())?;
        let request = options.into_request(method, user);

        debug!(
            "{} {} via '{}' as {}",
            method,
            request.path,
            provider.name(),
            request.username().unwrap_or("anonymous")
        );

        let response = provider.handle(request).await?;
        if !response.matches(method) {
            return Err(Error::InvalidInput(format!(
                "Provider '{}' answered {} with the wrong shape",
                provider.name(),
                method
            )));
        }
        Ok(response)
    }

    pub async fn read(&self, options: FileOptions) -> Result<File> {
        self.execute(Method::Read, options).await?.into_file()
    }

    pub async fn write(&self, options: FileOptions) -> Result<File> {
        self.execute(Method::Write, options).await?.into_file()
    }

    pub async fn list(&self, options: FileOptions) -> Result<Vec<File>> {
        self.execute(Method::List, options).await?.into_files()
    }

    /// Move `options.path` to `options.new_path`.
    pub async fn move_file(&self, options: FileOptions) -> Result<File> {
        self.execute(Method::Move, options).await?.into_file()
    }

    pub async fn delete(&self, options: FileOptions) -> Result<File> {
        self.execute(Method::Delete, options).await?.into_file()
    }

    pub async fn mkdir(&self, options: FileOptions) -> Result<File> {
        self.execute(Method::Mkdir, options).await?.into_file()
    }

    pub async fn read_acl(&self, options: FileOptions) -> Result<Vec<Acl>> {
        self.execute(Method::ReadAcl, options).await?.into_acl()
    }

    pub async fn write_acl(&self, options: FileOptions) -> Result<Vec<Acl>> {
        self.execute(Method::WriteAcl, options).await?.into_acl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fsgate_common::{Access, Content, User};
    use fsgate_session::{LoginOptions, Navigation};
    use fsgate_storage::{DuplicatePolicy, FileProvider, FileRequest, MemoryProvider};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Provider answering every request with a file describing it.
    #[derive(Default)]
    struct EchoProvider {
        seen: Mutex<Vec<FileRequest>>,
    }

    #[async_trait]
    impl FileProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn handle(&self, request: FileRequest) -> Result<Response> {
            self.seen.lock().unwrap().push(request.clone());
            let mut file = File::new(&request.path).with_provider("echo");
            file.data = request.data;
            Ok(match request.method {
                Method::List => Response::Files(vec![file]),
                Method::ReadAcl | Method::WriteAcl => Response::Acl(vec![]),
                _ => Response::File(file),
            })
        }
    }

    /// Provider answering with the wrong shape.
    struct Confused;

    #[async_trait]
    impl FileProvider for Confused {
        fn name(&self) -> &str {
            "confused"
        }

        async fn handle(&self, _request: FileRequest) -> Result<Response> {
            Ok(Response::Files(vec![]))
        }
    }

    /// Session with a fixed answer, counting checks.
    struct FixedSession {
        user: Result<Option<User>>,
        checks: AtomicU32,
    }

    impl FixedSession {
        fn new(user: Result<Option<User>>) -> Arc<Self> {
            Arc::new(Self {
                user,
                checks: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SessionManager for FixedSession {
        async fn check(&self) -> Result<Option<User>> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.user.clone()
        }

        async fn login(&self, _options: LoginOptions) -> Result<Navigation> {
            Err(Error::NotSupported("fixed".to_string()))
        }

        async fn logout(&self) -> Result<Option<User>> {
            Ok(None)
        }

        fn current(&self) -> Option<User> {
            self.user.clone().ok().flatten()
        }
    }

    fn echo_dispatcher(session: Arc<dyn SessionManager>) -> (Arc<EchoProvider>, Dispatcher) {
        let registry = Arc::new(ProviderRegistry::new());
        let echo = Arc::new(EchoProvider::default());
        registry.register("echo", echo.clone()).unwrap();
        (echo, Dispatcher::new(registry, session))
    }

    #[tokio::test]
    async fn test_write_end_to_end() {
        let (echo, dispatcher) = echo_dispatcher(Arc::new(AnonymousSession));

        let file = dispatcher
            .write(
                FileOptions::new("/docs/a.txt")
                    .content("hello")
                    .duplicate_policy(DuplicatePolicy::Overwrite),
            )
            .await
            .unwrap();

        assert_eq!(file.path, "/docs/a.txt");
        assert_eq!(file.data.unwrap().content, Content::Text("hello".to_string()));

        let seen = echo.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::Write);
        assert_eq!(seen[0].duplicate_policy, DuplicatePolicy::Overwrite);
        assert!(seen[0].user.is_none());
    }

    #[tokio::test]
    async fn test_acting_user_and_extra_reach_provider() {
        let session = FixedSession::new(Ok(Some(User::new("1", "alice").with_token("tok"))));
        let (echo, dispatcher) = echo_dispatcher(session.clone());

        dispatcher
            .list(FileOptions::new("/").extra("retry", 5))
            .await
            .unwrap();

        let seen = echo.seen.lock().unwrap();
        assert_eq!(seen[0].token(), Some("tok"));
        assert_eq!(seen[0].extra, json!({"retry": 5}).as_object().unwrap().clone());
        assert_eq!(session.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_failure_stops_before_provider() {
        let session = FixedSession::new(Err(Error::Redirecting("https://app.test/".to_string())));
        let (echo, dispatcher) = echo_dispatcher(session);

        let result = dispatcher.read(FileOptions::new("/a.txt")).await;

        assert!(matches!(result, Err(Error::Redirecting(_))));
        assert!(echo.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_provider_fails() {
        let (echo, dispatcher) = echo_dispatcher(Arc::new(AnonymousSession));

        let result = dispatcher
            .read(FileOptions::new("/a.txt").provider("missing"))
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(echo.seen.lock().unwrap().is_empty());

        let empty = Dispatcher::anonymous(Arc::new(ProviderRegistry::new()));
        assert!(empty.list(FileOptions::new("/")).await.is_err());
    }

    #[tokio::test]
    async fn test_provider_override_and_shape_check() {
        let (_, dispatcher) = echo_dispatcher(Arc::new(AnonymousSession));
        dispatcher
            .registry()
            .register("confused", Arc::new(Confused))
            .unwrap();

        let result = dispatcher
            .delete(FileOptions::new("/a.txt").provider("confused"))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        // The current provider is untouched by the override.
        assert!(dispatcher.delete(FileOptions::new("/a.txt")).await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_provider_through_dispatcher() {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register("memory", Arc::new(MemoryProvider::new()))
            .unwrap();
        let dispatcher = Dispatcher::anonymous(registry);

        dispatcher.mkdir(FileOptions::new("/docs")).await.unwrap();
        dispatcher
            .write(FileOptions::new("/docs/a.txt").content("one"))
            .await
            .unwrap();

        let conflict = dispatcher
            .write(FileOptions::new("/docs/a.txt").content("two"))
            .await;
        assert!(matches!(conflict, Err(Error::AlreadyExists(_))));

        let moved = dispatcher
            .move_file(FileOptions::new("/docs/a.txt").new_path("/docs/b.txt"))
            .await
            .unwrap();
        assert_eq!(moved.path, "/docs/b.txt");

        let read = dispatcher.read(FileOptions::new("/docs/b.txt")).await.unwrap();
        assert_eq!(read.data.unwrap().content, Content::Text("one".to_string()));

        let acl = dispatcher
            .write_acl(FileOptions::new("/docs/b.txt").grant("bob", Access::READ))
            .await
            .unwrap();
        assert_eq!(acl.len(), 1);
        assert_eq!(
            dispatcher
                .read_acl(FileOptions::new("/docs/b.txt"))
                .await
                .unwrap()[0]
                .access,
            Access::READ
        );

        let listed = dispatcher.list(FileOptions::new("/docs")).await.unwrap();
        assert_eq!(listed.len(), 1);

        dispatcher.delete(FileOptions::new("/docs")).await.unwrap();
        assert!(dispatcher.read(FileOptions::new("/docs/b.txt")).await.is_err());
    }
}
