//! sqlite-backed `VariableStore`. The `user_variable` table is generated
//! from the script's `VariableSchema` at startup: one column per scripted
//! variable, typed to match, plus the reserved `username`/`passwd` columns.
//! The store file is deleted and recreated on every start unless `fresh_db`
//! is disabled.

use crate::ir::{VarType, VariableSchema, VariableValue};
use crate::store::{Mutator, PersistentUserRecord, StoreError, VariableStore};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub struct SqliteStore {
    pool: SqlitePool,
    schema: VariableSchema,
    /// Serializes every operation end-to-end. `update` holds this across
    /// its whole read-modify-write; sqlite's own connection-level locking
    /// is not enough by itself to make a `read`-then-`write` atomic.
    lock: Mutex<()>,
}

fn sql_type(ty: VarType) -> &'static str {
    match ty {
        VarType::Int => "INTEGER",
        VarType::Real => "REAL",
        VarType::Text => "TEXT",
    }
}

impl SqliteStore {
    /// Connects to (and, if `fresh_db`, recreates) the sqlite file at
    /// `path`, building the `user_variable` table from `schema`.
    pub async fn connect(path: &str, schema: VariableSchema, fresh_db: bool) -> Result<Self, StoreError> {
        if fresh_db && std::path::Path::new(path).exists() {
            std::fs::remove_file(path).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePool::connect(&url).await?;

        let mut ddl = String::from("CREATE TABLE IF NOT EXISTS user_variable (username TEXT PRIMARY KEY, passwd TEXT NOT NULL");
        for name in schema.scripted_names() {
            let ty = schema.type_of(name).expect("scripted name is in schema");
            ddl.push_str(&format!(", {} {} ", quote_ident(name), sql_type(ty)));
        }
        ddl.push(')');
        sqlx::query(&ddl).execute(&pool).await?;

        let store = SqliteStore {
            pool,
            schema,
            lock: Mutex::new(()),
        };
        store.ensure_guest_row().await?;
        Ok(store)
    }

    async fn ensure_guest_row(&self) -> Result<(), StoreError> {
        let existing = sqlx::query("SELECT username FROM user_variable WHERE username = ?")
            .bind("Guest")
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        self.insert_row("Guest", "").await
    }

    async fn insert_row(&self, username: &str, passwd: &str) -> Result<(), StoreError> {
        let mut columns = vec!["username".to_string(), "passwd".to_string()];
        let mut placeholders = vec!["?".to_string(), "?".to_string()];
        for name in self.schema.scripted_names() {
            columns.push(quote_ident(name));
            placeholders.push("?".to_string());
        }
        let sql = format!(
            "INSERT INTO user_variable ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut query = sqlx::query(&sql).bind(username.to_string()).bind(passwd.to_string());
        for name in self.schema.scripted_names() {
            let default = self.schema.default_of(name).unwrap();
            query = bind_value(query, default);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q VariableValue,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        VariableValue::Int(v) => query.bind(v),
        VariableValue::Real(v) => query.bind(v),
        VariableValue::Text(v) => query.bind(v.as_str()),
    }
}

fn value_from_row(row: &sqlx::sqlite::SqliteRow, name: &str, ty: VarType) -> Result<VariableValue, StoreError> {
    match ty {
        VarType::Int => Ok(VariableValue::Int(row.try_get::<i64, _>(name)?)),
        VarType::Real => Ok(VariableValue::Real(row.try_get::<f64, _>(name)?)),
        VarType::Text => Ok(VariableValue::Text(row.try_get::<String, _>(name)?)),
    }
}

#[async_trait]
impl VariableStore for SqliteStore {
    async fn lookup(&self, username: &str) -> Result<Option<PersistentUserRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let row = sqlx::query("SELECT * FROM user_variable WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };

        let mut values = HashMap::new();
        for name in self.schema.scripted_names() {
            let ty = self.schema.type_of(name).unwrap();
            values.insert(name.to_string(), value_from_row(&row, name, ty)?);
        }
        Ok(Some(PersistentUserRecord {
            username: row.try_get("username")?,
            passwd: row.try_get("passwd")?,
            values,
        }))
    }

    async fn insert_default(&self, username: &str, passwd: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let existing = sqlx::query("SELECT username FROM user_variable WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(StoreError::Conflict(username.to_string()));
        }
        self.insert_row(username, passwd).await
    }

    async fn verify(&self, username: &str, passwd: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let row = sqlx::query("SELECT passwd FROM user_variable WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound(username.to_string()));
        };
        let stored: String = row.try_get("passwd")?;
        if stored != passwd {
            return Err(StoreError::WrongPassword(username.to_string()));
        }
        Ok(())
    }

    async fn read(&self, username: &str, var: &str) -> Result<VariableValue, StoreError> {
        let _guard = self.lock.lock().await;
        if var == "username" || var == "passwd" {
            let col = var;
            let row = sqlx::query(&format!("SELECT {col} FROM user_variable WHERE username = ?"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
            return Ok(VariableValue::Text(row.try_get(col)?));
        }
        let ty = self
            .schema
            .type_of(var)
            .ok_or_else(|| StoreError::UnknownVariable(var.to_string()))?;
        let col = quote_ident(var);
        let row = sqlx::query(&format!("SELECT {col} FROM user_variable WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        value_from_row(&row, var, ty)
    }

    async fn write(&self, username: &str, var: &str, value: VariableValue) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        if self.schema.type_of(var).is_none() {
            return Err(StoreError::UnknownVariable(var.to_string()));
        }
        let col = quote_ident(var);
        let sql = format!("UPDATE user_variable SET {col} = ? WHERE username = ?");
        let query = sqlx::query(&sql);
        let query = bind_value(query, &value);
        let result = query.bind(username).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(username.to_string()));
        }
        Ok(())
    }

    async fn update(&self, username: &str, var: &str, mutate: Mutator) -> Result<VariableValue, StoreError> {
        let _guard = self.lock.lock().await;
        let current = if var == "username" || var == "passwd" {
            let col = var;
            let row = sqlx::query(&format!("SELECT {col} FROM user_variable WHERE username = ?"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
            VariableValue::Text(row.try_get(col)?)
        } else {
            let ty = self
                .schema
                .type_of(var)
                .ok_or_else(|| StoreError::UnknownVariable(var.to_string()))?;
            let col = quote_ident(var);
            let row = sqlx::query(&format!("SELECT {col} FROM user_variable WHERE username = ?"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
            value_from_row(&row, var, ty)?
        };
        let updated = mutate(&current)?;
        let col = quote_ident(var);
        let sql = format!("UPDATE user_variable SET {col} = ? WHERE username = ?");
        let query = sqlx::query(&sql);
        let query = bind_value(query, &updated);
        let result = query.bind(username).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(username.to_string()));
        }
        Ok(updated)
    }
}
