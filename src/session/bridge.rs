//! The content-bridge layer: reifies a stored [`Session`] as a
//! [`Context`] and vice versa (spec §4.3).

use super::SessionStore;
use crate::context::build_user_info_block;
use crate::types::Message;
use crate::{Context, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bridges one session to the in-memory [`Context`] shape the Agent
/// Runtime operates on. Construct with `(session_id, user_id, user_name,
/// store)`; mutations go through the bridge so the store and the
/// in-process cache never diverge.
pub struct SessionBridge {
    session_id: String,
    user_id: String,
    user_name: String,
    store: Arc<dyn SessionStore>,
    cache: Mutex<Option<Context>>,
}

impl SessionBridge {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            store,
            cache: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the bridged [`Context`], loaded from the store and cached.
    /// If `refresh` is true, the cache is bypassed and reloaded.
    ///
    /// Every retrieval prepends a synthetic system message carrying the
    /// "User info:" block (spec §4.1, §4.3) — the bridge is the single
    /// place that block gets attached, so the runtime's own
    /// system-message synthesis (spec §4.1 step 4) only has to worry
    /// about the template instructions half of the prompt.
    pub async fn get_context(&self, refresh: bool) -> Result<Context> {
        let mut guard = self.cache.lock().await;
        if !refresh {
            if let Some(ctx) = guard.as_ref() {
                return Ok(ctx.clone());
            }
        }

        let session = self
            .store
            .load(&self.session_id)
            .await?
            .ok_or_else(|| Error::session_not_found(&self.session_id))?;

        let mut context = session.context;
        let info_block = build_user_info_block(&self.user_id, &self.user_name, &context.metadata);
        context.set_system_message(info_block, context.last_active);

        *guard = Some(context.clone());
        Ok(context)
    }

    /// Appends a message through the store (transactionally persisted)
    /// and updates the cache to match.
    pub async fn add_message(&self, message: Message, now: u64) -> Result<()> {
        self.store
            .append_message(&self.session_id, message.clone(), now)
            .await?;

        let mut guard = self.cache.lock().await;
        if let Some(ctx) = guard.as_mut() {
            ctx.append_message(message, now);
        }
        Ok(())
    }

    /// Merges `updates` into the session's metadata properties, in the
    /// store and (for the parts mirrored there) in the cached context.
    pub async fn update_metadata(&self, updates: HashMap<String, serde_json::Value>) -> Result<()> {
        self.store
            .update_metadata(&self.session_id, updates.clone())
            .await?;

        let mut guard = self.cache.lock().await;
        if let Some(ctx) = guard.as_mut() {
            ctx.metadata.extend(updates);
        }
        Ok(())
    }

    /// Atomically replaces the session's messages with `ctx`'s, keeping
    /// the store as the source of truth and refreshing the cache.
    pub async fn sync_from_context(&self, ctx: &Context) -> Result<()> {
        self.store.clear_messages(&self.session_id).await?;
        for message in &ctx.messages {
            self.store
                .append_message(&self.session_id, message.clone(), message.timestamp)
                .await?;
        }

        let mut guard = self.cache.lock().await;
        *guard = Some(ctx.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;

    async fn bridge_with_store() -> (SessionBridge, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new(3600));
        store.create("s1", "u1", "Alice", 0).await.unwrap();
        let bridge = SessionBridge::new("s1", "u1", "Alice", store.clone());
        (bridge, store)
    }

    #[tokio::test]
    async fn test_get_context_prepends_user_info_block() {
        let (bridge, _store) = bridge_with_store().await;
        let ctx = bridge.get_context(false).await.unwrap();
        assert_eq!(ctx.messages[0].role, crate::types::MessageRole::System);
        assert!(ctx.messages[0].text_content().contains("user_id: u1"));
    }

    #[tokio::test]
    async fn test_add_message_persists_and_updates_cache() {
        let (bridge, store) = bridge_with_store().await;
        bridge.get_context(false).await.unwrap();
        bridge.add_message(Message::user("hi", 1), 1).await.unwrap();

        let stored = store.load("s1").await.unwrap().unwrap();
        assert_eq!(stored.metadata.message_count, 1);

        let cached = bridge.get_context(false).await.unwrap();
        assert!(cached.messages.iter().any(|m| m.text_content() == "hi"));
    }

    #[tokio::test]
    async fn test_missing_session_errors() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(3600));
        let bridge = SessionBridge::new("missing", "u1", "Alice", store);
        let err = bridge.get_context(false).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }
}
