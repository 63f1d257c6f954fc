//! Wildcard binding notifications consumed by the Config Applier.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardEvent {
    /// A concrete stream matching `wildcard`'s prefix has appeared.
    StreamTagResolved { wildcard: String, concrete: String },
    /// The last concrete stream bound to `wildcard` has expired.
    StreamTagRemoved { wildcard: String, concrete: String },
}
