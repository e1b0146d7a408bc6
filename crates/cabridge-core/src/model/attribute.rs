use crate::model::{
    flag::Flags,
    kind::{AttributeId, AttributeType, EntityId},
};

///
/// Attribute
///
/// Metadata record for one typed, named property of an entity type.
/// Identity is (declarer, symbol); restrictions are separate descriptors
/// linked back through `restriction_of`.
///

#[derive(Clone, Debug)]
pub struct Attribute {
    pub(crate) id: AttributeId,
    pub(crate) symbol: String,
    pub(crate) declarer: EntityId,
    pub(crate) ty: AttributeType,
    pub(crate) flags: Flags,
    pub(crate) inverse: Option<AttributeId>,
    pub(crate) restriction_of: Option<AttributeId>,
    pub(crate) restrictions: Vec<AttributeId>,
    pub(crate) accessors: Option<Accessors>,
    pub(crate) writer: Writer,
}

impl Attribute {
    pub(crate) fn new(
        id: AttributeId,
        symbol: impl Into<String>,
        declarer: EntityId,
        ty: AttributeType,
        flags: Flags,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            declarer,
            ty,
            flags,
            inverse: None,
            restriction_of: None,
            restrictions: Vec::new(),
            accessors: None,
            writer: Writer::default(),
        }
    }

    // restricted_copy
    // copy for a subtype; inverse and writer travel with it
    pub(crate) fn restricted_copy(
        &self,
        id: AttributeId,
        declarer: EntityId,
        ty: AttributeType,
        flags: Flags,
    ) -> Self {
        Self {
            id,
            symbol: self.symbol.clone(),
            declarer,
            ty,
            flags: self.flags | flags,
            inverse: self.inverse,
            restriction_of: Some(self.id),
            restrictions: Vec::new(),
            accessors: self.accessors.clone(),
            writer: self.writer,
        }
    }

    #[must_use]
    pub const fn id(&self) -> AttributeId {
        self.id
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub const fn declarer(&self) -> EntityId {
        self.declarer
    }

    #[must_use]
    pub const fn ty(&self) -> AttributeType {
        self.ty
    }

    /// The referenced entity type, if this is a domain attribute.
    #[must_use]
    pub const fn target(&self) -> Option<EntityId> {
        self.ty.entity()
    }

    #[must_use]
    pub const fn flags(&self) -> Flags {
        self.flags
    }

    #[must_use]
    pub const fn inverse(&self) -> Option<AttributeId> {
        self.inverse
    }

    #[must_use]
    pub const fn restriction_of(&self) -> Option<AttributeId> {
        self.restriction_of
    }

    #[must_use]
    pub fn restrictions(&self) -> &[AttributeId] {
        &self.restrictions
    }

    #[must_use]
    pub const fn accessors(&self) -> Option<&Accessors> {
        self.accessors.as_ref()
    }

    #[must_use]
    pub const fn writer(&self) -> Writer {
        self.writer
    }

    //
    // flag helpers
    //

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        self.flags.contains(Flags::COLLECTION)
    }

    #[must_use]
    pub const fn is_domain(&self) -> bool {
        self.ty.is_domain()
    }

    #[must_use]
    pub const fn is_dependent(&self) -> bool {
        self.flags.contains(Flags::DEPENDENT)
    }

    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.flags.contains(Flags::OWNER)
    }

    #[must_use]
    pub const fn is_cascaded(&self) -> bool {
        self.flags.contains(Flags::CASCADED)
    }

    #[must_use]
    pub const fn is_logical(&self) -> bool {
        self.flags.contains(Flags::LOGICAL)
    }

    #[must_use]
    pub const fn is_autogenerated(&self) -> bool {
        self.flags.contains(Flags::AUTOGENERATED)
    }

    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.flags.contains(Flags::OPTIONAL)
    }

    #[must_use]
    pub const fn is_disjoint(&self) -> bool {
        self.flags.contains(Flags::DISJOINT)
    }

    /// Domain attribute that is neither an owner nor a dependent reference.
    #[must_use]
    pub const fn is_independent(&self) -> bool {
        self.is_domain() && !self.is_dependent() && !self.is_owner()
    }

    #[must_use]
    pub const fn is_saved(&self) -> bool {
        !self.flags.intersects(Flags::UNSAVED.union(Flags::DERIVED))
    }

    #[must_use]
    pub const fn is_creatable(&self) -> bool {
        self.is_saved() && !self.flags.contains(Flags::UPDATE_ONLY)
    }

    #[must_use]
    pub const fn is_updatable(&self) -> bool {
        self.is_saved() && !self.flags.contains(Flags::CREATE_ONLY)
    }

    /// Fetched with the owning object: nondomain values, non-logical
    /// dependents, and anything explicitly flagged `fetched`.
    #[must_use]
    pub const fn is_fetched(&self) -> bool {
        if self.flags.contains(Flags::UNFETCHED) {
            return false;
        }

        !self.is_domain()
            || self.flags.intersects(Flags::FETCHED.union(Flags::SAVED_FETCH))
            || (self.is_dependent() && !self.is_logical())
    }
}

///
/// Accessors
/// Native reader/writer method names recorded during introspection.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Accessors {
    pub property: String,
    pub reader: String,
    pub writer: String,
}

///
/// Writer
///
/// Per-descriptor writer behavior consulted by `ObjectGraph::set_attribute`.
/// This replaces redefining generated accessor methods.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Writer {
    pub normalize: Normalize,
    pub inverse: InverseSync,
    pub warn_owner_change: bool,
}

///
/// Normalize
/// Input normalization applied before a value is stored.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Normalize {
    #[default]
    None,
    /// Empty text becomes null.
    Text,
    /// Native dates are converted to calendar date-times.
    Date,
}

///
/// InverseSync
/// How a write propagates to the inverse attribute.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InverseSync {
    #[default]
    None,
    /// Scalar side: setting `a.x = b` links `b` back to `a`.
    Scalar,
    /// Collection side with a scalar inverse: adding `b` to `a.xs` sets `b`'s
    /// scalar inverse to `a`.
    Append,
}
