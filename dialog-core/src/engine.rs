//! Wires the compiled script (`StateGraph` + `VariableSchema`), a
//! `VariableStore` backend, the `Interpreter`, and the `SessionRegistry`
//! into the single facade the HTTP adapter drives. This plays the same role
//! the teacher's engine facade plays over its VM: the adapter never touches
//! `Interpreter` or `SessionRegistry` directly.

use crate::error::CoreError;
use crate::interpreter::Interpreter;
use crate::ir::{StateGraph, VariableSchema};
use crate::parser::parse_sources;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::store::VariableStore;
use crate::validator;
use std::sync::Arc;
use std::time::Duration;

/// Parses and validates `sources` into a `(VariableSchema, StateGraph)`
/// pair, ready to hand to a store constructor and then [`Engine::new`].
pub fn compile(sources: &[String]) -> Result<(VariableSchema, StateGraph), CoreError> {
    let definitions = parse_sources(sources)?;
    validator::build(definitions)
}

pub struct Engine {
    interpreter: Interpreter,
    registry: SessionRegistry,
    store: Arc<dyn VariableStore>,
}

impl Engine {
    pub fn new(graph: StateGraph, store: Arc<dyn VariableStore>, signing_key: Vec<u8>, session_ttl: Duration) -> Self {
        Engine {
            interpreter: Interpreter::new(graph),
            registry: SessionRegistry::new(store.clone(), signing_key, session_ttl),
            store,
        }
    }

    /// `GET /`: a fresh guest session plus its Welcome-state greeting.
    pub async fn connect(&self) -> Result<(Vec<String>, String), CoreError> {
        let (session, token) = self.registry.connect().await;
        let msg = self.interpreter.hello(&session, self.store.as_ref()).await?;
        Ok((msg, token))
    }

    /// `GET /send`: resolves `token`, evaluates `msg` against the current
    /// state, evicts the session on exit.
    pub async fn send(&self, token: &str, msg: &str) -> Result<(Vec<String>, bool), CoreError> {
        let session = self.registry.resolve(token).await?;
        let (replies, exited) = self
            .interpreter
            .on_message(&session, self.store.as_ref(), msg)
            .await?;
        if exited {
            self.evict_resolved(&session).await;
        }
        Ok((replies, exited))
    }

    /// `GET /echo`: resolves `token`, runs the idle-timeout scan. `reset` is
    /// always `false` - this server always runs the script from whatever is
    /// on disk at startup and never hot-reloads it.
    pub async fn echo(&self, token: &str, seconds: i64) -> Result<(Vec<String>, bool, bool), CoreError> {
        let session = self.registry.resolve(token).await?;
        let (replies, exited, _moved) = self
            .interpreter
            .on_timeout(&session, self.store.as_ref(), seconds)
            .await?;
        if exited {
            self.evict_resolved(&session).await;
        }
        Ok((replies, exited, false))
    }

    /// `GET /login`.
    pub async fn login(&self, token: &str, username: &str, passwd: &str) -> Result<Option<String>, CoreError> {
        let session = self.registry.resolve(token).await?;
        self.registry.login(&session, username, passwd).await
    }

    /// `GET /register`.
    pub async fn register(&self, token: &str, username: &str, passwd: &str) -> Result<Option<String>, CoreError> {
        let session = self.registry.resolve(token).await?;
        self.registry.register(&session, username, passwd).await
    }

    async fn evict_resolved(&self, session: &Arc<Session>) {
        let username = session.username().await;
        self.registry.evict(&username).await;
    }
}
