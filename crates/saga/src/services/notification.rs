//! Notification provider trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::SagaError;

/// Result of a successfully sent notification.
#[derive(Debug, Clone)]
pub struct NotificationReceipt {
    /// The message ID assigned by the provider.
    pub id: String,
}

/// Trait for buyer-notification providers.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Returns true if provider credentials are configured.
    ///
    /// An unconfigured provider is a legitimate runtime state: the
    /// orchestrator simulates success deterministically.
    fn is_configured(&self) -> bool;

    /// Sends a notification to a contact handle.
    async fn send(&self, to: &str, body: &str) -> Result<NotificationReceipt, SagaError>;
}

#[derive(Debug)]
struct InMemoryNotificationState {
    sent: Vec<(String, String)>,
    next_id: u32,
    fail_on_send: bool,
    configured: bool,
}

impl Default for InMemoryNotificationState {
    fn default() -> Self {
        Self {
            sent: Vec::new(),
            next_id: 0,
            fail_on_send: false,
            configured: true,
        }
    }
}

/// In-memory notification service for testing and unconfigured runtimes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    /// Creates a new in-memory notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on the next send call.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Toggles whether the provider reports itself as configured.
    pub fn set_configured(&self, configured: bool) {
        self.state.write().unwrap().configured = configured;
    }

    /// Returns the number of sent notifications.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns the last `(to, body)` pair sent, if any.
    pub fn last_sent(&self) -> Option<(String, String)> {
        self.state.read().unwrap().sent.last().cloned()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    fn is_configured(&self) -> bool {
        self.state.read().unwrap().configured
    }

    async fn send(&self, to: &str, body: &str) -> Result<NotificationReceipt, SagaError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            // Mirrors the provider's machine-checkable invalid-destination code.
            return Err(SagaError::Notification(format!(
                "invalid destination {to} (code 21211)"
            )));
        }

        state.next_id += 1;
        let id = format!("SM-{:04}", state.next_id);
        state.sent.push((to.to_string(), body.to_string()));
        Ok(NotificationReceipt { id })
    }
}
