//! Command parameter validation and execution.
//!
//! Parameters arrive as an untyped map on the wire ([`CommandCall`]) and
//! are checked against the command's [`ParamDef`] schema before the
//! handler runs: unknown names, missing required values, type mismatches
//! and null members inside multi-valued lists all reject the command as
//! malformed. Handlers therefore only ever see a [`ParamValues`] that
//! satisfies the declared schema.

use crate::error::{CoreError, CoreResult};
use crate::schema::CommandDef;
use crate::txn::WriteTransaction;
use crate::types::InstanceId;
use loomdb_codec::{CommandCall, Value};
use std::collections::BTreeMap;

/// Validated parameter values, keyed by parameter name.
///
/// Optional parameters that were absent are present here as
/// [`Value::Null`], so handlers can read every declared name.
#[derive(Debug, Clone)]
pub struct ParamValues {
    values: BTreeMap<String, Value>,
}

impl ParamValues {
    /// Validates the raw call parameters against the command schema.
    pub fn validate(def: &CommandDef, call: &CommandCall) -> CoreResult<Self> {
        for name in call.params.keys() {
            if !def.params.iter().any(|p| &p.name == name) {
                return Err(CoreError::malformed(format!(
                    "command {} has no parameter {name}",
                    def.name
                )));
            }
        }

        let mut values = BTreeMap::new();
        for param in &def.params {
            let raw = call.params.get(&param.name).cloned().unwrap_or(Value::Null);
            if raw.is_null() {
                if !param.nullable {
                    return Err(CoreError::malformed(format!(
                        "command {} requires parameter {}",
                        def.name, param.name
                    )));
                }
                values.insert(param.name.clone(), Value::Null);
                continue;
            }

            let checked = if param.multi {
                let Value::List(items) = raw else {
                    return Err(CoreError::malformed(format!(
                        "parameter {}.{} expects a list of {}",
                        def.name,
                        param.name,
                        param.ty.name()
                    )));
                };
                let mut converted = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        return Err(CoreError::malformed(format!(
                            "parameter {}.{} contains a null member",
                            def.name, param.name
                        )));
                    }
                    converted.push(param.ty.convert(&item).ok_or_else(|| {
                        CoreError::malformed(format!(
                            "parameter {}.{} expects {} members, got {}",
                            def.name,
                            param.name,
                            param.ty.name(),
                            item.type_name()
                        ))
                    })?);
                }
                Value::List(converted)
            } else {
                param.ty.convert(&raw).ok_or_else(|| {
                    CoreError::malformed(format!(
                        "parameter {}.{} expects {}, got {}",
                        def.name,
                        param.name,
                        param.ty.name(),
                        raw.type_name()
                    ))
                })?
            };
            values.insert(param.name.clone(), checked);
        }

        Ok(Self { values })
    }

    /// The raw value of a parameter. Absent optionals read as null.
    pub fn value(&self, name: &str) -> CoreResult<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| CoreError::malformed(format!("no such parameter {name}")))
    }

    /// Whether the parameter is null (or was absent).
    pub fn is_null(&self, name: &str) -> CoreResult<bool> {
        Ok(self.value(name)?.is_null())
    }

    /// Reads a boolean parameter.
    pub fn boolean(&self, name: &str) -> CoreResult<bool> {
        match self.value(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(type_error(name, "bool", other)),
        }
    }

    /// Reads an integer parameter.
    pub fn integer(&self, name: &str) -> CoreResult<i64> {
        match self.value(name)? {
            Value::Integer(i) => Ok(*i),
            other => Err(type_error(name, "integer", other)),
        }
    }

    /// Reads a float parameter.
    pub fn float(&self, name: &str) -> CoreResult<f64> {
        match self.value(name)? {
            Value::Float(f) => Ok(*f),
            other => Err(type_error(name, "float", other)),
        }
    }

    /// Reads a text parameter.
    pub fn text(&self, name: &str) -> CoreResult<&str> {
        match self.value(name)? {
            Value::Text(s) => Ok(s),
            other => Err(type_error(name, "text", other)),
        }
    }

    /// Reads a bytes parameter.
    pub fn bytes(&self, name: &str) -> CoreResult<&[u8]> {
        match self.value(name)? {
            Value::Bytes(b) => Ok(b),
            other => Err(type_error(name, "bytes", other)),
        }
    }

    /// Reads the members of a multi-valued parameter. A null parameter
    /// reads as an empty list.
    pub fn list(&self, name: &str) -> CoreResult<&[Value]> {
        match self.value(name)? {
            Value::List(items) => Ok(items),
            Value::Null => Ok(&[]),
            other => Err(type_error(name, "list", other)),
        }
    }

    /// Reads an integer parameter as an instance id.
    pub fn id(&self, name: &str) -> CoreResult<InstanceId> {
        let raw = self.integer(name)?;
        u64::try_from(raw)
            .map(InstanceId::new)
            .map_err(|_| CoreError::malformed(format!("parameter {name} is not a valid id: {raw}")))
    }
}

fn type_error(name: &str, expected: &str, got: &Value) -> CoreError {
    CoreError::malformed(format!(
        "parameter {name} expects {expected}, got {}",
        got.type_name()
    ))
}

/// Executes one command call inside the given write transaction.
///
/// Looks up the definition, validates the parameters and invokes the
/// handler. Used both by the live write pipeline and by log replay.
pub fn execute(txn: &mut WriteTransaction<'_>, call: &CommandCall) -> CoreResult<Value> {
    let schema = txn.state().schema().clone();
    let def = schema
        .command(&call.name)
        .ok_or_else(|| CoreError::malformed(format!("unknown command {}", call.name)))?;
    let params = ParamValues::validate(def, call)?;
    let handler = def
        .handler
        .as_ref()
        .ok_or_else(|| CoreError::malformed(format!("command {} has no handler", call.name)))?
        .clone();
    handler(txn, &params)
}
