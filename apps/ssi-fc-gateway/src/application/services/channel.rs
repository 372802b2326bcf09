//! One authenticated venue session: token manager, REST dispatcher and
//! stream supervisor built from a single [`SessionConfig`].

use std::sync::Arc;

use crate::application::ports::TokenProvider;
use crate::domain::session::{Session, SessionKind};
use crate::domain::stream::{EventKind, StreamEvent, StreamState};
use crate::error::GatewayError;
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::ssi::{Dispatcher, SessionManager, build_http_client};
use crate::infrastructure::stream::StreamSupervisor;

#[derive(Debug, Clone)]
pub(crate) struct SessionChannel {
    pub(crate) session: Arc<SessionManager>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) stream: Arc<StreamSupervisor>,
}

impl SessionChannel {
    /// Wire the components for `config`, which must belong to `expected`.
    pub(crate) fn open(config: SessionConfig, expected: SessionKind) -> Result<Self, GatewayError> {
        if config.kind() != expected {
            return Err(GatewayError::InvalidRequest(format!(
                "expected a {expected} session config, got {}",
                config.kind()
            )));
        }

        let config = Arc::new(config);
        let client = build_http_client(&config)?;
        let session = Arc::new(SessionManager::new(Arc::clone(&config), client.clone()));
        let tokens: Arc<dyn TokenProvider> = session.clone();
        let dispatcher = Dispatcher::new(client, &config, Arc::clone(&tokens));
        let stream = Arc::new(StreamSupervisor::new(&config, tokens));

        Ok(Self {
            session,
            dispatcher,
            stream,
        })
    }

    pub(crate) fn current_session(&self) -> Result<Arc<Session>, GatewayError> {
        self.session.current_session()
    }

    pub(crate) fn register_channel(&self, channel: impl Into<String>) -> bool {
        self.stream.subscribe_channel(channel)
    }

    pub(crate) fn register_handler<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.stream.register_handler(kind, handler);
    }

    pub(crate) fn stream_state(&self) -> StreamState {
        self.stream.state()
    }
}
