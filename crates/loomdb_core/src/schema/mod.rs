//! Schema descriptors and build-time validation.
//!
//! A schema is assembled once, at store construction, from explicit
//! [`EntityDef`] and [`CommandDef`] descriptors. There is no reflection:
//! every name, type, flag and reciprocal pairing is stated by the author and
//! checked here. Modeling mistakes surface as
//! [`CoreError::InvalidModel`](crate::CoreError::InvalidModel) from
//! [`SchemaBuilder::build`], never at runtime.

mod command;
mod entity;

pub use command::{CommandDef, CommandHandler, ParamDef};
pub use entity::{
    AttributeDef, Cardinality, EntityDef, EntityDefBuilder, ReciprocalDef, RelationDef, ScalarType,
};

use crate::error::{CoreError, CoreResult};
use loomdb_codec::Value;
use std::collections::HashMap;

/// Name prefix reserved for internal bookkeeping.
///
/// Externally supplied entity, attribute, relation, command and parameter
/// names must not start with this prefix.
pub const RESERVED_PREFIX: &str = "__";

/// Name of the builtin readonly-switch command.
pub const READONLY_COMMAND: &str = "__readonly";

/// Parameter name of the builtin readonly-switch command.
pub const READONLY_PARAM: &str = "enabled";

/// Whether a command name belongs to the builtin set.
///
/// Builtins are exempt from the readonly gate; everything else is a
/// mutation as far as submission is concerned.
pub(crate) fn is_builtin(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// An immutable, validated schema: all entity and command definitions of
/// one store.
#[derive(Debug, Clone)]
pub struct Schema {
    entities: Vec<EntityDef>,
    entity_index: HashMap<String, usize>,
    commands: HashMap<String, CommandDef>,
}

impl Schema {
    /// Starts building a schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            entities: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Returns the index of the named entity type.
    #[must_use]
    pub fn entity_index(&self, name: &str) -> Option<usize> {
        self.entity_index.get(name).copied()
    }

    /// Returns the entity definition at `index`.
    #[must_use]
    pub fn entity(&self, index: usize) -> &EntityDef {
        &self.entities[index]
    }

    /// Returns all entity definitions in declaration order.
    #[must_use]
    pub fn entities(&self) -> &[EntityDef] {
        &self.entities
    }

    /// Returns the named command definition.
    #[must_use]
    pub fn command(&self, name: &str) -> Option<&CommandDef> {
        self.commands.get(name)
    }
}

/// Builder and validator for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    entities: Vec<EntityDef>,
    commands: Vec<CommandDef>,
}

impl SchemaBuilder {
    /// Adds an entity definition.
    #[must_use]
    pub fn entity(mut self, def: EntityDef) -> Self {
        self.entities.push(def);
        self
    }

    /// Adds a command definition.
    #[must_use]
    pub fn command(mut self, def: CommandDef) -> Self {
        self.commands.push(def);
        self
    }

    /// Validates everything and produces the immutable schema.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidModel`] on any modeling rule violation:
    /// duplicate or reserved names, unknown relation targets, reciprocal
    /// view collisions, commands without handlers.
    pub fn build(self) -> CoreResult<Schema> {
        let mut entities = self.entities;

        // Entity names.
        let mut entity_index = HashMap::new();
        for (i, def) in entities.iter().enumerate() {
            check_name("entity", &def.name)?;
            if entity_index.insert(def.name.clone(), i).is_some() {
                return Err(CoreError::invalid_model(format!(
                    "duplicate entity name: {}",
                    def.name
                )));
            }
        }

        // Attribute and relation names per entity.
        for def in &entities {
            let mut seen = HashMap::new();
            for attr in &def.attributes {
                check_name("attribute", &attr.name)?;
                if seen.insert(attr.name.clone(), ()).is_some() {
                    return Err(CoreError::invalid_model(format!(
                        "duplicate field name {}.{}",
                        def.name, attr.name
                    )));
                }
            }
            for rel in &def.relations {
                check_name("relation", &rel.name)?;
                if seen.insert(rel.name.clone(), ()).is_some() {
                    return Err(CoreError::invalid_model(format!(
                        "duplicate field name {}.{}",
                        def.name, rel.name
                    )));
                }
            }
        }

        // Resolve relation targets and reciprocal pairings. Collected first,
        // applied after, since a pairing mutates both ends.
        let mut pairings: Vec<(usize, usize, usize, String)> = Vec::new();
        for (tail, def) in entities.iter().enumerate() {
            for (slot, rel) in def.relations.iter().enumerate() {
                let head = *entity_index.get(&rel.target).ok_or_else(|| {
                    CoreError::invalid_model(format!(
                        "relation {}.{} targets unknown entity {}",
                        def.name, rel.name, rel.target
                    ))
                })?;
                if let Some(view) = &rel.reciprocal {
                    check_name("reciprocal view", view)?;
                    pairings.push((tail, slot, head, view.clone()));
                }
            }
        }
        for def in entities.iter_mut() {
            def.relation_target = def
                .relations
                .iter()
                .map(|r| entity_index[&r.target])
                .collect();
            def.relation_view = vec![None; def.relations.len()];
        }
        for (tail, slot, head, view) in pairings {
            let head_def = &mut entities[head];
            if head_def.attribute_index.contains_key(&view)
                || head_def.relation_index.contains_key(&view)
                || head_def.reciprocal_index.contains_key(&view)
            {
                return Err(CoreError::invalid_model(format!(
                    "reciprocal view name {}.{view} collides with an existing field",
                    head_def.name
                )));
            }
            let view_idx = head_def.reciprocals.len();
            head_def.reciprocal_index.insert(view.clone(), view_idx);
            head_def.reciprocals.push(ReciprocalDef {
                name: view,
                tail_entity: tail,
                tail_relation: slot,
            });
            entities[tail].relation_view[slot] = Some(view_idx);
        }

        // Commands, with the builtin readonly switch injected last.
        let mut commands = HashMap::new();
        for def in self.commands {
            check_name("command", &def.name)?;
            for param in &def.params {
                check_name("parameter", &param.name)?;
            }
            let mut param_names = HashMap::new();
            for param in &def.params {
                if param_names.insert(param.name.clone(), ()).is_some() {
                    return Err(CoreError::invalid_model(format!(
                        "duplicate parameter {} on command {}",
                        param.name, def.name
                    )));
                }
            }
            if def.handler.is_none() {
                return Err(CoreError::invalid_model(format!(
                    "command {} has no handler",
                    def.name
                )));
            }
            if commands.insert(def.name.clone(), def).is_some() {
                return Err(CoreError::invalid_model("duplicate command name"));
            }
        }
        commands.insert(READONLY_COMMAND.to_string(), builtin_readonly());

        Ok(Schema {
            entities,
            entity_index,
            commands,
        })
    }
}

/// The builtin command that toggles the store's readonly flag.
///
/// Routed through the write pipeline like any other command so its position
/// in the durable history is well defined and replay restores the flag.
fn builtin_readonly() -> CommandDef {
    CommandDef::new(READONLY_COMMAND)
        .param(ParamDef::required(READONLY_PARAM, ScalarType::Bool))
        .handler(|txn, params| {
            txn.set_readonly(params.boolean(READONLY_PARAM)?);
            Ok(Value::Null)
        })
}

fn check_name(kind: &str, name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_model(format!("empty {kind} name")));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(CoreError::invalid_model(format!(
            "{kind} name {name} uses the reserved {RESERVED_PREFIX} prefix"
        )));
    }
    Ok(())
}
