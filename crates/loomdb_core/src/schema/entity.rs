//! Entity type descriptors.

use loomdb_codec::Value;
use std::collections::HashMap;

/// Scalar attribute and parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
    /// Byte string.
    Bytes,
}

impl ScalarType {
    /// Returns the type's name, for error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
        }
    }

    /// Converts a non-null value to this type, if it is acceptable.
    ///
    /// The only coercion performed is the lossless `Integer` to `Float`
    /// widening; everything else must match exactly.
    #[must_use]
    pub fn convert(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Integer, Value::Integer(_))
            | (Self::Float, Value::Float(_))
            | (Self::Text, Value::Text(_))
            | (Self::Bytes, Value::Bytes(_)) => Some(value.clone()),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, Value::Integer(i)) => Some(Value::Float(*i as f64)),
            _ => None,
        }
    }
}

/// Declares one attribute of an entity type.
#[derive(Debug, Clone)]
pub struct AttributeDef {
    /// Attribute name.
    pub name: String,
    /// Scalar type of the attribute's values.
    pub ty: ScalarType,
    /// Whether the attribute may be left null at commit.
    pub nullable: bool,
    /// Whether non-null values must be distinct across live instances.
    pub unique: bool,
}

impl AttributeDef {
    /// Creates a non-nullable, non-unique attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            unique: false,
        }
    }

    /// Marks the attribute nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the attribute unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// A single owning reference.
    One,
    /// A set of owning references.
    Many,
}

/// Declares one relation of an entity type.
#[derive(Debug, Clone)]
pub struct RelationDef {
    /// Relation name.
    pub name: String,
    /// Name of the target entity type.
    pub target: String,
    /// One or many.
    pub cardinality: Cardinality,
    /// Whether a to-one relation may be left unset at commit.
    ///
    /// Always `true` for to-many relations (an empty set is valid).
    pub nullable: bool,
    /// Name of the derived reciprocal view exposed on the target entity,
    /// if any.
    pub reciprocal: Option<String>,
}

impl RelationDef {
    /// Creates a non-nullable to-one relation.
    #[must_use]
    pub fn one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::One,
            nullable: false,
            reciprocal: None,
        }
    }

    /// Creates a to-many relation.
    #[must_use]
    pub fn many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::Many,
            nullable: true,
            reciprocal: None,
        }
    }

    /// Marks a to-one relation nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Pairs this relation with a reciprocal view named `view` on the
    /// target entity.
    #[must_use]
    pub fn reciprocal(mut self, view: impl Into<String>) -> Self {
        self.reciprocal = Some(view.into());
        self
    }
}

/// A reciprocal view resolved at schema build time.
///
/// The view lives on the "head" entity and is derived from the forward
/// relation at slot `tail_relation` of the "tail" entity.
#[derive(Debug, Clone)]
pub struct ReciprocalDef {
    /// View name on the head entity.
    pub name: String,
    /// Index of the tail entity type.
    pub tail_entity: usize,
    /// Relation slot on the tail entity.
    pub tail_relation: usize,
}

/// A fully described entity type.
///
/// `EntityDef`s are created through [`EntityDef::builder`], assembled into a
/// schema once at store construction, and immutable afterwards. Attribute
/// and relation positions double as the slot indices of the fixed-layout
/// instance representation.
#[derive(Debug, Clone)]
pub struct EntityDef {
    /// Entity type name.
    pub name: String,
    /// Ordered attribute definitions.
    pub attributes: Vec<AttributeDef>,
    /// Ordered relation definitions.
    pub relations: Vec<RelationDef>,

    // Derived by the schema builder.
    pub(crate) attribute_index: HashMap<String, usize>,
    pub(crate) relation_index: HashMap<String, usize>,
    /// Entity index of each relation's target, parallel to `relations`.
    pub(crate) relation_target: Vec<usize>,
    /// View index on the target entity for paired relations, parallel to
    /// `relations`.
    pub(crate) relation_view: Vec<Option<usize>>,
    /// Reciprocal views exposed on this entity.
    pub(crate) reciprocals: Vec<ReciprocalDef>,
    pub(crate) reciprocal_index: HashMap<String, usize>,
}

impl EntityDef {
    /// Starts building an entity definition.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EntityDefBuilder {
        EntityDefBuilder {
            name: name.into(),
            attributes: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Returns the slot of the named attribute.
    #[must_use]
    pub fn attribute_slot(&self, name: &str) -> Option<usize> {
        self.attribute_index.get(name).copied()
    }

    /// Returns the slot of the named relation.
    #[must_use]
    pub fn relation_slot(&self, name: &str) -> Option<usize> {
        self.relation_index.get(name).copied()
    }

    /// Returns the index of the named reciprocal view.
    #[must_use]
    pub fn reciprocal_slot(&self, name: &str) -> Option<usize> {
        self.reciprocal_index.get(name).copied()
    }
}

/// Builder for [`EntityDef`].
#[derive(Debug)]
pub struct EntityDefBuilder {
    name: String,
    attributes: Vec<AttributeDef>,
    relations: Vec<RelationDef>,
}

impl EntityDefBuilder {
    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, attr: AttributeDef) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Finishes the definition.
    ///
    /// Name and slot validation happens when the schema is built, not here.
    #[must_use]
    pub fn build(self) -> EntityDef {
        let attribute_index = self
            .attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
        let relation_index = self
            .relations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        let relation_count = self.relations.len();
        EntityDef {
            name: self.name,
            attributes: self.attributes,
            relations: self.relations,
            attribute_index,
            relation_index,
            relation_target: Vec::with_capacity(relation_count),
            relation_view: Vec::with_capacity(relation_count),
            reciprocals: Vec::new(),
            reciprocal_index: HashMap::new(),
        }
    }
}
