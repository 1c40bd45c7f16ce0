//! Session list view model
//!
//! Holds the caller's sessions, newest activity first. The list refreshes on
//! its own whenever a token becomes available and can be refreshed by hand.
//! Failures never surface: the list simply becomes empty.

use crate::api::{ApiClient, ApiError, SessionSummary};
use crate::store::Store;
use crate::ClientContext;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Sessions {
    sessions: Store<Vec<SessionSummary>>,
    token: Arc<Mutex<Option<String>>>,
    api: ApiClient,
}

impl Sessions {
    pub fn attach(ctx: &ClientContext) -> Self {
        let this = Self {
            sessions: Store::new(Vec::new()),
            token: Arc::new(Mutex::new(None)),
            api: ctx.api().clone(),
        };

        let handle = this.clone();
        ctx.access_token().subscribe(move |value| {
            let Some(token) = value.clone() else {
                return;
            };
            handle.set_token(token);

            let handle = handle.clone();
            crate::spawn_detached(async move {
                handle.refresh().await;
            });
        });

        this
    }

    pub fn store(&self) -> &Store<Vec<SessionSummary>> {
        &self.sessions
    }

    pub fn current(&self) -> Vec<SessionSummary> {
        self.sessions.get()
    }

    fn set_token(&self, token: String) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token);
        }
    }

    fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|slot| slot.clone())
    }

    /// Re-fetch the list and publish it.
    pub async fn refresh(&self) {
        let Some(token) = self.token() else {
            log::warn!("Session refresh requested without an access token");
            self.sessions.set(Vec::new());
            return;
        };

        match self.api.list_sessions(&token).await {
            Ok(list) => {
                log::debug!("Fetched {} sessions", list.len());
                self.sessions.set(list);
            }
            Err(e) => {
                log::error!("Error fetching sessions: {}", e);
                self.sessions.set(Vec::new());
            }
        }
    }

    /// Fetch one session by id with the current token.
    pub async fn get(&self, id: i64) -> Result<SessionSummary, ApiError> {
        let token = self.token().ok_or(ApiError::MissingToken)?;
        self.api.get_session(&token, id).await
    }
}
