//! Action execution. Each action runs against a session, a reply buffer, and
//! the raw request input; `Update` runs its read-modify-write through the
//! store's `update`, so concurrent updates to the same variable never race.

use crate::error::CoreError;
use crate::ir::{Action, UpdateOp, UpdateValue, VariableValue};
use crate::session::{Session, TERMINAL_STATE};
use crate::store::{StoreError, VariableStore};

pub async fn execute(
    action: &Action,
    session: &Session,
    store: &dyn VariableStore,
    replies: &mut Vec<String>,
    request_input: &str,
) -> Result<(), CoreError> {
    match action {
        Action::Exit => {
            session.set_state_index(TERMINAL_STATE).await;
            Ok(())
        }
        Action::Goto { target, verified } => {
            if *verified && !session.is_logged_in().await {
                return Err(CoreError::Login);
            }
            session.set_state_index(*target as i64).await;
            Ok(())
        }
        Action::Update { var, op, value } => {
            let username = session.username().await;
            let op = op.clone();
            let value = value.clone();
            let request_input = request_input.to_string();
            store
                .update(
                    &username,
                    var,
                    Box::new(move |current: &VariableValue| {
                        let rhs = materialize(&value, current, &request_input)?;
                        apply_op(&op, current.clone(), rhs)
                    }),
                )
                .await
                .map_err(|e| match e {
                    StoreError::InvalidValue(msg) => CoreError::BadRequest(msg),
                    other => CoreError::Store(other),
                })?;
            Ok(())
        }
        Action::Speak(parts) => {
            let username = session.username().await;
            let mut rendered = String::new();
            for part in parts {
                match part {
                    crate::ir::SpeakPart::Literal(s) => rendered.push_str(s),
                    crate::ir::SpeakPart::VarRef(name) => {
                        let v = store.read(&username, name).await?;
                        rendered.push_str(&v.to_display_string());
                    }
                    crate::ir::SpeakPart::CopyMarker => rendered.push_str(request_input),
                }
            }
            replies.push(rendered);
            Ok(())
        }
    }
}

fn materialize(
    value: &UpdateValue,
    current: &VariableValue,
    request_input: &str,
) -> Result<VariableValue, StoreError> {
    match value {
        UpdateValue::Literal(v) => Ok(v.clone()),
        UpdateValue::Copy => match current {
            VariableValue::Int(_) => request_input
                .trim()
                .parse::<i64>()
                .map(VariableValue::Int)
                .map_err(|_| StoreError::InvalidValue("expected an integer value".into())),
            VariableValue::Real(_) => request_input
                .trim()
                .parse::<f64>()
                .map(VariableValue::Real)
                .map_err(|_| StoreError::InvalidValue("expected a real-valued input".into())),
            VariableValue::Text(_) => Ok(VariableValue::Text(request_input.to_string())),
        },
    }
}

fn apply_op(op: &UpdateOp, current: VariableValue, rhs: VariableValue) -> Result<VariableValue, StoreError> {
    match (op, current, rhs) {
        (UpdateOp::Set, _, rhs) => Ok(rhs),
        (UpdateOp::Add, VariableValue::Int(a), VariableValue::Int(b)) => Ok(VariableValue::Int(a + b)),
        (UpdateOp::Add, VariableValue::Real(a), VariableValue::Real(b)) => Ok(VariableValue::Real(a + b)),
        (UpdateOp::Sub, VariableValue::Int(a), VariableValue::Int(b)) => Ok(VariableValue::Int(a - b)),
        (UpdateOp::Sub, VariableValue::Real(a), VariableValue::Real(b)) => Ok(VariableValue::Real(a - b)),
        _ => Err(StoreError::InvalidValue(
            "Add/Sub require matching numeric types (rejected statically; should be unreachable)".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryStore;

    async fn store_with_balance() -> MemoryStore {
        let mut schema = crate::ir::VariableSchema::new();
        schema.declare("balance", VariableValue::Int(10)).unwrap();
        let store = MemoryStore::new(schema);
        store.insert_default("alice", "pw").await.unwrap();
        store
    }

    #[tokio::test]
    async fn exit_sets_terminal_state() {
        let session = Session::new_guest("Guest_1".into());
        let store = store_with_balance().await;
        let mut replies = Vec::new();
        execute(&Action::Exit, &session, &store, &mut replies, "").await.unwrap();
        assert!(session.is_terminal().await);
    }

    #[tokio::test]
    async fn goto_verified_without_login_fails() {
        let session = Session::new_guest("Guest_1".into());
        let store = store_with_balance().await;
        let mut replies = Vec::new();
        let action = Action::Goto { target: 1, verified: true };
        let result = execute(&action, &session, &store, &mut replies, "").await;
        assert!(matches!(result, Err(CoreError::Login)));
    }

    #[tokio::test]
    async fn update_add_literal() {
        let session = Session::new_guest("alice".into());
        session.set_logged_in(true).await;
        let store = store_with_balance().await;
        let mut replies = Vec::new();
        let action = Action::Update {
            var: "balance".into(),
            op: UpdateOp::Add,
            value: UpdateValue::Literal(VariableValue::Int(5)),
        };
        execute(&action, &session, &store, &mut replies, "").await.unwrap();
        assert_eq!(store.read("alice", "balance").await.unwrap(), VariableValue::Int(15));
    }

    #[tokio::test]
    async fn update_set_copy_parses_request_input() {
        let session = Session::new_guest("alice".into());
        let store = store_with_balance().await;
        let mut replies = Vec::new();
        let action = Action::Update {
            var: "balance".into(),
            op: UpdateOp::Set,
            value: UpdateValue::Copy,
        };
        execute(&action, &session, &store, &mut replies, "99").await.unwrap();
        assert_eq!(store.read("alice", "balance").await.unwrap(), VariableValue::Int(99));
    }

    #[tokio::test]
    async fn update_copy_into_int_rejects_non_numeric_input() {
        let session = Session::new_guest("alice".into());
        let store = store_with_balance().await;
        let mut replies = Vec::new();
        let action = Action::Update {
            var: "balance".into(),
            op: UpdateOp::Set,
            value: UpdateValue::Copy,
        };
        let result = execute(&action, &session, &store, &mut replies, "not a number").await;
        assert!(matches!(result, Err(CoreError::BadRequest(_))));
        assert_eq!(store.read("alice", "balance").await.unwrap(), VariableValue::Int(10));
    }

    #[tokio::test]
    async fn speak_concatenates_literal_var_and_copy() {
        let session = Session::new_guest("alice".into());
        let store = store_with_balance().await;
        let mut replies = Vec::new();
        let action = Action::Speak(vec![
            crate::ir::SpeakPart::Literal("balance=".into()),
            crate::ir::SpeakPart::VarRef("balance".into()),
            crate::ir::SpeakPart::Literal(" input=".into()),
            crate::ir::SpeakPart::CopyMarker,
        ]);
        execute(&action, &session, &store, &mut replies, "hi").await.unwrap();
        assert_eq!(replies, vec!["balance=10 input=hi".to_string()]);
    }
}
