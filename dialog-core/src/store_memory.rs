use crate::ir::{VariableSchema, VariableValue};
use crate::store::{Mutator, PersistentUserRecord, StoreError, VariableStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Inner {
    rows: HashMap<String, PersistentUserRecord>,
}

/// In-memory `VariableStore`, used for tests and for local runs with no
/// `db_path` configured.
pub struct MemoryStore {
    schema: VariableSchema,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(schema: VariableSchema) -> Self {
        let mut rows = HashMap::new();
        rows.insert(
            "Guest".to_string(),
            PersistentUserRecord::defaults(&schema, "Guest", ""),
        );
        MemoryStore {
            schema,
            inner: RwLock::new(Inner { rows }),
        }
    }
}

#[async_trait]
impl VariableStore for MemoryStore {
    async fn lookup(&self, username: &str) -> Result<Option<PersistentUserRecord>, StoreError> {
        let r = self.inner.read().await;
        Ok(r.rows.get(username).cloned())
    }

    async fn insert_default(&self, username: &str, passwd: &str) -> Result<(), StoreError> {
        let mut w = self.inner.write().await;
        if w.rows.contains_key(username) {
            return Err(StoreError::Conflict(username.to_string()));
        }
        w.rows.insert(
            username.to_string(),
            PersistentUserRecord::defaults(&self.schema, username, passwd),
        );
        Ok(())
    }

    async fn verify(&self, username: &str, passwd: &str) -> Result<(), StoreError> {
        let r = self.inner.read().await;
        let row = r
            .rows
            .get(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        if row.passwd != passwd {
            return Err(StoreError::WrongPassword(username.to_string()));
        }
        Ok(())
    }

    async fn read(&self, username: &str, var: &str) -> Result<VariableValue, StoreError> {
        let r = self.inner.read().await;
        let row = r
            .rows
            .get(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        if var == "username" {
            return Ok(VariableValue::Text(row.username.clone()));
        }
        if var == "passwd" {
            return Ok(VariableValue::Text(row.passwd.clone()));
        }
        row.values
            .get(var)
            .cloned()
            .ok_or_else(|| StoreError::UnknownVariable(var.to_string()))
    }

    async fn write(&self, username: &str, var: &str, value: VariableValue) -> Result<(), StoreError> {
        let mut w = self.inner.write().await;
        let row = w
            .rows
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        if !row.values.contains_key(var) {
            return Err(StoreError::UnknownVariable(var.to_string()));
        }
        row.values.insert(var.to_string(), value);
        Ok(())
    }

    async fn update(&self, username: &str, var: &str, mutate: Mutator) -> Result<VariableValue, StoreError> {
        let mut w = self.inner.write().await;
        let row = w
            .rows
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        if !row.values.contains_key(var) {
            return Err(StoreError::UnknownVariable(var.to_string()));
        }
        let current = row.values.get(var).unwrap().clone();
        let updated = mutate(&current)?;
        row.values.insert(var.to_string(), updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with_balance() -> VariableSchema {
        let mut schema = VariableSchema::new();
        schema.declare("balance", VariableValue::Int(0)).unwrap();
        schema
    }

    #[tokio::test]
    async fn guest_row_exists_at_construction() {
        let store = MemoryStore::new(schema_with_balance());
        let row = store.lookup("Guest").await.unwrap().unwrap();
        assert_eq!(row.passwd, "");
    }

    #[tokio::test]
    async fn insert_default_rejects_duplicate_username() {
        let store = MemoryStore::new(schema_with_balance());
        store.insert_default("alice", "pw").await.unwrap();
        let err = store.insert_default("alice", "pw2").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_password() {
        let store = MemoryStore::new(schema_with_balance());
        store.insert_default("alice", "pw").await.unwrap();
        assert!(store.verify("alice", "pw").await.is_ok());
        assert!(matches!(
            store.verify("alice", "wrong").await.unwrap_err(),
            StoreError::WrongPassword(_)
        ));
    }

    #[tokio::test]
    async fn read_write_round_trip() {
        let store = MemoryStore::new(schema_with_balance());
        store.insert_default("alice", "pw").await.unwrap();
        store
            .write("alice", "balance", VariableValue::Int(42))
            .await
            .unwrap();
        let v = store.read("alice", "balance").await.unwrap();
        assert_eq!(v, VariableValue::Int(42));
    }

    #[tokio::test]
    async fn update_applies_mutator_and_returns_new_value() {
        let store = MemoryStore::new(schema_with_balance());
        store.insert_default("alice", "pw").await.unwrap();
        store
            .write("alice", "balance", VariableValue::Int(10))
            .await
            .unwrap();
        let result = store
            .update(
                "alice",
                "balance",
                Box::new(|current| match current {
                    VariableValue::Int(n) => Ok(VariableValue::Int(n + 1)),
                    _ => unreachable!(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(result, VariableValue::Int(11));
        assert_eq!(
            store.read("alice", "balance").await.unwrap(),
            VariableValue::Int(11)
        );
    }

    #[tokio::test]
    async fn read_unknown_user_fails() {
        let store = MemoryStore::new(schema_with_balance());
        assert!(matches!(
            store.read("nobody", "balance").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}
