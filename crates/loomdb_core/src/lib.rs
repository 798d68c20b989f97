//! # LoomDB Core
//!
//! An embedded, command-sourced object store.
//!
//! The application describes its data as a [`Schema`]: entity types with
//! typed attributes and relations, and commands with declarative
//! parameter schemas and handler procedures. All mutations are submitted
//! as [`TransactionBatch`]es of command calls; a single writer applies
//! them in order, appends each committed batch to a durable log, and
//! publishes the result for lock-free concurrent reads. Recovery rebuilds
//! the state from the newest snapshot plus the log tail by rerunning the
//! recorded commands.
//!
//! ## Example
//!
//! ```
//! use loomdb_core::{
//!     AttributeDef, CommandDef, EntityDef, ParamDef, ScalarType, Schema, Store, StoreConfig,
//!     CommandCall, TransactionBatch, Value,
//! };
//!
//! let schema = Schema::builder()
//!     .entity(
//!         EntityDef::builder("Person")
//!             .attribute(AttributeDef::new("name", ScalarType::Text).unique())
//!             .build(),
//!     )
//!     .command(
//!         CommandDef::new("create_person")
//!             .param(ParamDef::required("name", ScalarType::Text))
//!             .handler(|txn, params| {
//!                 let person = txn
//!                     .insert("Person")?
//!                     .set("name", params.text("name")?)?
//!                     .done()?;
//!                 Ok(Value::Integer(person.id().as_u64() as i64))
//!             }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let store = Store::open_in_memory(schema, StoreConfig::new("people")).unwrap();
//! let futures = store
//!     .submit(TransactionBatch::new("req-1").call(CommandCall::new("create_person").param("name", "john")))
//!     .unwrap();
//! for future in futures {
//!     future.wait().unwrap();
//! }
//! let found = store.read(|txn| txn.find("Person", "name").equals_to("john").is_ok());
//! assert!(found);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod config;
mod error;
mod pipeline;
mod recovery;
mod schema;
mod state;
mod store;
mod txn;
mod types;

pub use command::ParamValues;
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use pipeline::{CommandFuture, TransactionBatch};
pub use schema::{
    AttributeDef, Cardinality, CommandDef, CommandHandler, EntityDef, EntityDefBuilder, ParamDef,
    ReciprocalDef, RelationDef, ScalarType, Schema, SchemaBuilder, READONLY_COMMAND,
    READONLY_PARAM, RESERVED_PREFIX,
};
pub use store::Store;
pub use txn::{
    InsertBuilder, Matcher, ObjectRef, ReadTransaction, Selection, UpdateBuilder, WriteTransaction,
};
pub use types::{InstanceId, ModelVersion, TransactionId};

pub use loomdb_codec::{CommandCall, Value};
