//! Script front-end and session runtime for the scripted conversational
//! server. The front-end ([`lexer`], [`parser`], [`validator`]) turns dialog
//! scripts into a [`ir::StateGraph`] + [`ir::VariableSchema`]; the runtime
//! ([`session`], [`store`], [`conditions`], [`actions`], [`interpreter`],
//! [`registry`]) executes that graph against many concurrent sessions.
//! [`engine`] wires the two halves together for an HTTP (or any other)
//! adapter to drive.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod session;
pub mod store;
pub mod store_memory;
#[cfg(feature = "sqlite")]
pub mod store_sqlite;
pub mod validator;

pub use engine::Engine;
pub use error::{CoreError, CoreResult};
