//! Command type descriptors.

use crate::command::ParamValues;
use crate::error::CoreResult;
use crate::schema::entity::ScalarType;
use crate::txn::WriteTransaction;
use loomdb_codec::Value;
use std::sync::Arc;

/// The execution procedure of a command.
///
/// Runs against the batch's write transaction with the validated parameter
/// values; its return value resolves the command's future.
pub type CommandHandler =
    Arc<dyn Fn(&mut WriteTransaction<'_>, &ParamValues) -> CoreResult<Value> + Send + Sync>;

/// Declares one parameter of a command.
#[derive(Debug, Clone)]
pub struct ParamDef {
    /// Parameter name.
    pub name: String,
    /// Scalar type of the parameter (element type when `multi`).
    pub ty: ScalarType,
    /// Whether the parameter may be absent or null.
    pub nullable: bool,
    /// Whether the parameter is a list of values.
    pub multi: bool,
}

impl ParamDef {
    /// Creates a required scalar parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            multi: false,
        }
    }

    /// Creates an optional scalar parameter.
    #[must_use]
    pub fn optional(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            multi: false,
        }
    }

    /// Marks the parameter multi-valued.
    #[must_use]
    pub const fn multi(mut self) -> Self {
        self.multi = true;
        self
    }
}

/// A command definition: declarative parameter schema plus execution
/// procedure.
#[derive(Clone)]
pub struct CommandDef {
    /// Command type name.
    pub name: String,
    /// Ordered parameter definitions.
    pub params: Vec<ParamDef>,
    /// The execution procedure.
    pub(crate) handler: Option<CommandHandler>,
}

impl CommandDef {
    /// Starts a command definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            handler: None,
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    /// Sets the execution procedure.
    #[must_use]
    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut WriteTransaction<'_>, &ParamValues) -> CoreResult<Value> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for CommandDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
