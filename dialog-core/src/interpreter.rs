//! The three Mealy-style entry points the session runtime drives requests
//! through. Holds only the compiled `StateGraph` - sessions and the store
//! are passed in per call, so one interpreter instance is shared by every
//! concurrent session.

use crate::actions;
use crate::error::CoreError;
use crate::ir::StateGraph;
use crate::session::{Session, TERMINAL_STATE};
use crate::store::VariableStore;

pub struct Interpreter {
    graph: StateGraph,
}

impl Interpreter {
    pub fn new(graph: StateGraph) -> Self {
        Interpreter { graph }
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    /// Executes the current state's `onEnter` speaks. Used right after a
    /// state entry to surface the new state's greeting.
    pub async fn hello(&self, session: &Session, store: &dyn VariableStore) -> Result<Vec<String>, CoreError> {
        let idx = session.state_index().await;
        if idx == TERMINAL_STATE {
            return Ok(Vec::new());
        }
        let state = self.graph.get(idx as usize);
        let mut replies = Vec::new();
        for action in &state.on_enter {
            actions::execute(action, session, store, &mut replies, "").await?;
        }
        Ok(replies)
    }

    /// Evaluates `msg` against the current state's cases in source order;
    /// the first match consumes it, otherwise the default clause runs.
    pub async fn on_message(
        &self,
        session: &Session,
        store: &dyn VariableStore,
        msg: &str,
    ) -> Result<(Vec<String>, bool), CoreError> {
        let idx = session.state_index().await as usize;
        let state = self.graph.get(idx);
        let mut replies = Vec::new();
        let mut matched = false;

        for case in &state.cases {
            if case.condition.check(msg) {
                matched = true;
                for action in &case.actions {
                    actions::execute(action, session, store, &mut replies, msg).await?;
                }
                break;
            }
        }
        if !matched {
            for action in &state.default_actions {
                actions::execute(action, session, store, &mut replies, msg).await?;
            }
        }
        if !session.is_terminal().await {
            replies.extend(self.hello(session, store).await?);
        }
        Ok((replies, session.is_terminal().await))
    }

    /// Fires at most one threshold's actions: the first `T` with
    /// `last < T <= now` that changes `stateIndex` stops the scan.
    pub async fn on_timeout(
        &self,
        session: &Session,
        store: &dyn VariableStore,
        now_idle_seconds: i64,
    ) -> Result<(Vec<String>, bool, bool), CoreError> {
        let last = session.swap_last_idle_seconds(now_idle_seconds).await;
        let old_state = session.state_index().await;
        let state = self.graph.get(old_state as usize);
        let mut replies = Vec::new();

        for (threshold, acts) in &state.timeouts {
            if last < *threshold && *threshold <= now_idle_seconds {
                for action in acts {
                    actions::execute(action, session, store, &mut replies, "").await?;
                }
                let new_state = session.state_index().await;
                if new_state != old_state {
                    if new_state != TERMINAL_STATE {
                        replies.extend(self.hello(session, store).await?);
                    }
                    break;
                }
            }
        }

        let moved = session.state_index().await != old_state;
        let exited = session.is_terminal().await;
        Ok((replies, exited, moved))
    }
}
