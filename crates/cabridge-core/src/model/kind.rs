use derive_more::Display;

///
/// EntityId
/// Stable handle of an entity type inside one `DomainModel`.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("entity#{_0}")]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

///
/// AttributeId
/// Stable handle of an attribute descriptor inside one `DomainModel`.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("attribute#{_0}")]
pub struct AttributeId(pub(crate) u32);

impl AttributeId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

///
/// Primitive
/// Scalar (nondomain) attribute kinds.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[remain::sorted]
pub enum Primitive {
    Bool,
    Date,
    Float,
    Int,
    /// Untyped value, used when a collection element type cannot be inferred.
    Object,
    Text,
}

///
/// AttributeType
/// The type an attribute returns: another entity type or a primitive.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AttributeType {
    Entity(EntityId),
    Primitive(Primitive),
}

impl AttributeType {
    #[must_use]
    pub const fn entity(self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(id),
            Self::Primitive(_) => None,
        }
    }

    #[must_use]
    pub const fn is_domain(self) -> bool {
        matches!(self, Self::Entity(_))
    }
}

impl From<EntityId> for AttributeType {
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

impl From<Primitive> for AttributeType {
    fn from(primitive: Primitive) -> Self {
        Self::Primitive(primitive)
    }
}
