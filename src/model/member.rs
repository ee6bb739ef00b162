use std::fmt;

/// The kind of member a [`MemberRef`] names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A method, including property and event accessors visited on their own
    Method,
    /// A property, standing for its getter and setter
    Property,
    /// An event, standing for its add, remove and raise methods
    Event,
}

/// A member as seen by name predicates: its kind, the full name of the declaring type and
/// its simple name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// What kind of member this is
    pub kind: MemberKind,
    /// Full name of the declaring type, `Namespace.Type` or `Namespace.Outer/Inner`
    pub declaring_type: &'a str,
    /// Simple member name
    pub name: &'a str,
}

impl<'a> MemberRef<'a> {
    /// Create a new member reference
    #[must_use]
    pub fn new(kind: MemberKind, declaring_type: &'a str, name: &'a str) -> Self {
        MemberRef {
            kind,
            declaring_type,
            name,
        }
    }

    /// The `Type::Member` form matched by name patterns
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl fmt::Display for MemberRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}
