//! Lookups over the entity store.
//!
//! [`Matcher`] resolves instances through a unique-attribute index;
//! [`Selection`] enumerates all live instances of one entity type.

use crate::error::{CoreError, CoreResult};
use crate::state::StoreState;
use crate::txn::ObjectRef;
use loomdb_codec::Value;

/// A pending unique-attribute lookup.
///
/// Built by `find(entity, attribute)` on a transaction; name resolution
/// errors are deferred to the terminal call so lookups chain with a
/// single `?`.
pub struct Matcher<'a> {
    state: &'a StoreState,
    target: CoreResult<(usize, usize)>,
}

impl<'a> Matcher<'a> {
    pub(crate) fn new(state: &'a StoreState, entity: &str, attribute: &str) -> Self {
        let target = resolve(state, entity, attribute);
        Self { state, target }
    }

    /// Resolves the instance whose attribute equals `value`.
    ///
    /// A miss is an error: commands that require the instance to exist
    /// use this and fail the whole transaction when it does not.
    pub fn equals_to(self, value: impl Into<Value>) -> CoreResult<ObjectRef> {
        let (entity, slot) = self.target?;
        let value = value.into();
        self.state
            .get_by_unique(entity, slot, &value)
            .map(|id| ObjectRef { entity, id })
            .ok_or_else(|| {
                let def = self.state.schema().entity(entity);
                CoreError::not_found(&def.name, &def.attributes[slot].name, &value)
            })
    }

    /// Resolves the instance whose attribute equals `value`, or `None`
    /// when no instance matches.
    pub fn equals_to_or_null(self, value: impl Into<Value>) -> CoreResult<Option<ObjectRef>> {
        let (entity, slot) = self.target?;
        Ok(self
            .state
            .get_by_unique(entity, slot, &value.into())
            .map(|id| ObjectRef { entity, id }))
    }

    /// Resolves every value to an instance; any miss fails the lookup.
    pub fn all_contained_in(
        self,
        values: impl IntoIterator<Item = Value>,
    ) -> CoreResult<Vec<ObjectRef>> {
        let (entity, slot) = self.target?;
        let def = self.state.schema().entity(entity);
        values
            .into_iter()
            .map(|value| {
                self.state
                    .get_by_unique(entity, slot, &value)
                    .map(|id| ObjectRef { entity, id })
                    .ok_or_else(|| {
                        CoreError::not_found(&def.name, &def.attributes[slot].name, &value)
                    })
            })
            .collect()
    }

    /// Resolves the values that match, silently skipping misses.
    pub fn some_contained_in(
        self,
        values: impl IntoIterator<Item = Value>,
    ) -> CoreResult<Vec<ObjectRef>> {
        let (entity, slot) = self.target?;
        Ok(values
            .into_iter()
            .filter_map(|value| {
                self.state
                    .get_by_unique(entity, slot, &value)
                    .map(|id| ObjectRef { entity, id })
            })
            .collect())
    }
}

fn resolve(state: &StoreState, entity: &str, attribute: &str) -> CoreResult<(usize, usize)> {
    let index = state
        .schema()
        .entity_index(entity)
        .ok_or_else(|| CoreError::malformed(format!("unknown entity {entity}")))?;
    let def = state.schema().entity(index);
    let slot = def.attribute_slot(attribute).ok_or_else(|| {
        CoreError::malformed(format!("unknown attribute {entity}.{attribute}"))
    })?;
    if !def.attributes[slot].unique {
        return Err(CoreError::malformed(format!(
            "attribute {entity}.{attribute} is not unique; lookup requires a unique index"
        )));
    }
    Ok((index, slot))
}

/// All live instances of one entity type, in ascending id order.
pub struct Selection<'a> {
    state: &'a StoreState,
    entity: usize,
}

impl<'a> Selection<'a> {
    pub(crate) fn new(state: &'a StoreState, entity: &str) -> CoreResult<Self> {
        let entity = state
            .schema()
            .entity_index(entity)
            .ok_or_else(|| CoreError::malformed(format!("unknown entity {entity}")))?;
        Ok(Self { state, entity })
    }

    /// The number of live instances.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state.list(self.entity).count()
    }

    /// Refs to every live instance.
    #[must_use]
    pub fn all(&self) -> Vec<ObjectRef> {
        self.state
            .list(self.entity)
            .map(|id| ObjectRef {
                entity: self.entity,
                id,
            })
            .collect()
    }

    /// Refs to the instances accepted by the predicate.
    pub fn filter(
        &self,
        mut pred: impl FnMut(&ObjectRef) -> CoreResult<bool>,
    ) -> CoreResult<Vec<ObjectRef>> {
        let mut out = Vec::new();
        for id in self.state.list(self.entity) {
            let obj = ObjectRef {
                entity: self.entity,
                id,
            };
            if pred(&obj)? {
                out.push(obj);
            }
        }
        Ok(out)
    }
}
