pub mod api;
pub mod auth;
pub mod chat;
pub mod navigation;
pub mod sessions;
pub mod settings;
pub mod store;
pub mod time;
pub mod user;

use std::future::Future;
use std::sync::Arc;

use api::{ApiClient, UserInfo};
use auth::{AccessToken, TokenStore};
use chat::{ChannelHandlers, PayloadChannel, SessionRef};
use navigation::{login_path, Navigator};
use sessions::Sessions;
use settings::ClientSettings;
use store::{Mounted, Store};

/// Install the env_logger backend. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Run a future on the current tokio runtime without waiting for it.
///
/// Store subscribers are synchronous; this is how they kick off requests.
pub(crate) fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(e) => log::error!("No async runtime to run background work: {}", e),
    }
}

/// Shared collaborators for every component of the client.
///
/// Nothing touches the token until [`ClientContext::mount`] is called;
/// components attached before that simply wait.
pub struct ClientContext {
    settings: ClientSettings,
    api: ApiClient,
    tokens: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    mounted: Mounted,
    access_token: Store<Option<String>>,
    return_url: Option<String>,
}

impl ClientContext {
    /// `return_url` is carried to the login page so it can send the user back.
    pub fn new(
        settings: ClientSettings,
        tokens: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
        return_url: Option<String>,
    ) -> Self {
        let mounted = Mounted::new();
        let access_token = AccessToken::attach(
            &mounted,
            Arc::clone(&tokens),
            Arc::clone(&navigator),
            return_url.clone(),
        );

        Self {
            api: ApiClient::new(&settings),
            settings,
            tokens,
            navigator,
            mounted,
            access_token,
            return_url,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tokens(&self) -> Arc<dyn TokenStore> {
        Arc::clone(&self.tokens)
    }

    pub fn navigator(&self) -> Arc<dyn Navigator> {
        Arc::clone(&self.navigator)
    }

    pub fn return_url(&self) -> Option<&str> {
        self.return_url.as_deref()
    }

    pub fn access_token(&self) -> &Store<Option<String>> {
        &self.access_token
    }

    pub fn mounted(&self) -> &Mounted {
        &self.mounted
    }

    /// End of initialization: token-dependent work may start.
    pub fn mount(&self) {
        self.mounted.mount();
    }

    /// Store a freshly issued token.
    ///
    /// Once mounted the token is published right away; before that the
    /// mount-time read picks it up from the token store.
    pub fn login(&self, token: &str) -> Result<(), auth::TokenError> {
        self.tokens.set(token)?;
        if self.mounted.is_mounted() {
            self.access_token.set(Some(token.to_string()));
        }
        Ok(())
    }

    /// Forget the token and go back to the login page.
    pub fn logout(&self) {
        if let Err(e) = self.tokens.remove() {
            log::warn!("Failed to remove access token: {}", e);
        }
        self.access_token.set(None);
        self.navigator.goto(&login_path(self.return_url()));
    }

    pub fn user_infos(&self) -> Store<Option<UserInfo>> {
        user::UserInfos::attach(self)
    }

    pub fn sessions(&self) -> Sessions {
        Sessions::attach(self)
    }

    pub fn payloads(&self, session: SessionRef, handlers: ChannelHandlers) -> PayloadChannel {
        PayloadChannel::attach(self, session, handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::MemoryTokenStore;
    use navigation::RecordingNavigator;

    fn context(tokens: Arc<MemoryTokenStore>, nav: Arc<RecordingNavigator>) -> ClientContext {
        ClientContext::new(ClientSettings::default(), tokens, nav, None)
    }

    #[test]
    fn test_login_publishes_token() {
        let tokens = Arc::new(MemoryTokenStore::new());
        let nav = Arc::new(RecordingNavigator::new());
        let ctx = context(tokens.clone(), nav.clone());
        ctx.mount();

        ctx.login("fresh").unwrap();

        assert_eq!(tokens.get().unwrap().as_deref(), Some("fresh"));
        assert_eq!(ctx.access_token().get().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_login_before_mount_waits_for_mount() {
        let tokens = Arc::new(MemoryTokenStore::new());
        let nav = Arc::new(RecordingNavigator::new());
        let ctx = context(tokens.clone(), nav.clone());

        ctx.login("early").unwrap();

        assert_eq!(tokens.get().unwrap().as_deref(), Some("early"));
        assert_eq!(ctx.access_token().get(), None);

        ctx.mount();

        assert_eq!(ctx.access_token().get().as_deref(), Some("early"));
        assert_eq!(nav.last(), None);
    }

    #[tokio::test]
    async fn test_login_before_mount_sends_no_requests() {
        use std::time::Duration;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"sessions": []})))
            .mount(&server)
            .await;

        let settings = ClientSettings {
            api_url: server.uri(),
            ws_url: "ws://127.0.0.1:1".to_string(),
        };
        let ctx = ClientContext::new(
            settings,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(RecordingNavigator::new()),
            None,
        );
        let _sessions = ctx.sessions();

        ctx.login("jwt").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let requests = server.received_requests().await.unwrap_or_default();
        assert!(requests.is_empty());

        ctx.mount();
        tokio::time::timeout(Duration::from_secs(5), async {
            while server.received_requests().await.unwrap_or_default().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_logout_clears_and_redirects() {
        let tokens = Arc::new(MemoryTokenStore::with_token("old"));
        let nav = Arc::new(RecordingNavigator::new());
        let ctx = context(tokens.clone(), nav.clone());
        ctx.mount();

        ctx.logout();

        assert_eq!(tokens.get().unwrap(), None);
        assert_eq!(ctx.access_token().get(), None);
        assert_eq!(nav.last().as_deref(), Some("/login"));
    }

    #[test]
    fn test_spawn_without_runtime_does_not_panic() {
        spawn_detached(async {});
    }
}
