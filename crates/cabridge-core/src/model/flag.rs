use bitflags::bitflags;
use std::fmt;

bitflags! {
    ///
    /// Flags
    ///
    /// Semantic qualifiers carried by an attribute descriptor.
    ///

    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct Flags: u32 {
        const COLLECTION = 1;
        const DEPENDENT = 1 << 1;
        const OWNER = 1 << 2;
        /// Dependent whose save is propagated by the remote service.
        const CASCADED = 1 << 3;
        /// Dependent whose persistence is not cascaded by the remote service.
        const LOGICAL = 1 << 4;
        /// Populated by the service as a side effect of creating the owner.
        const AUTOGENERATED = 1 << 5;
        const AUTOGENERATED_ON_UPDATE = 1 << 6;
        /// Dependent reachable from several owner types, one populated at a time.
        const DISJOINT = 1 << 7;
        const OPTIONAL = 1 << 8;
        const UNSAVED = 1 << 9;
        const SAVED = 1 << 10;
        const DERIVED = 1 << 11;
        const VOLATILE = 1 << 12;
        const CREATE_ONLY = 1 << 13;
        const UPDATE_ONLY = 1 << 14;
        const UNIDIRECTIONAL = 1 << 15;
        const FETCHED = 1 << 16;
        const UNFETCHED = 1 << 17;
        const INCLUDE_IN_SAVE_TEMPLATE = 1 << 18;
        const SAVED_FETCH = 1 << 19;
    }
}

impl Flags {
    /// Render the set flags as lower-case names, e.g. `dependent|cascaded`.
    #[must_use]
    pub fn names(self) -> Vec<String> {
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}
