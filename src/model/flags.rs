//! Type and method attribute flags.
//!
//! Type flags follow the constant-module layout of ECMA-335 II.23.1.15; method flags are split
//! into the access level ([`MemberAccess`]) and the remaining modifier bits
//! ([`MethodModifiers`]), which are kept verbatim so that a write never loses bits it did not
//! mean to touch.

use bitflags::bitflags;

/// Mask selecting the member access bits of `MethodAttributes`
pub const METHOD_ACCESS_MASK: u32 = 0x0007;

#[allow(non_snake_case)]
/// All possible flags for `TypeAttributes`
pub mod TypeAttributes {
    /// Use this mask to retrieve visibility information
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Class has no public scope
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Class has public scope
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Class is nested with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Class is nested with private visibility
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Class is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Class cannot be extended
    pub const SEALED: u32 = 0x0000_0100;
    /// Class name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Initialize the class any time before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

bitflags! {
    /// Method attributes other than the access level.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MethodModifiers: u32 {
        /// Method is an unmanaged export
        const UNMANAGED_EXPORT = 0x0008;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method can only be overridden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, depending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
        /// Method has security associated with it
        const HAS_SECURITY = 0x4000;
        /// Method calls another method containing security code
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

impl MethodModifiers {
    /// Extract the modifier bits from raw `MethodAttributes`, keeping unknown bits
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        Self::from_bits_retain(flags & !METHOD_ACCESS_MASK)
    }
}

/// Accessibility of a method (ECMA-335 II.23.1.10).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberAccess {
    /// Member not referenceable
    CompilerControlled,
    /// Accessible only by the parent type
    Private,
    /// Accessible by sub-types only in this assembly
    FamilyAndAssembly,
    /// Accessible by anyone in the assembly
    Assembly,
    /// Accessible only by type and sub-types
    Family,
    /// Accessible by sub-types anywhere, plus anyone in the assembly
    FamilyOrAssembly,
    /// Accessible by anyone who has visibility to this scope
    Public,
}

impl MemberAccess {
    /// Extract the access level from raw `MethodAttributes`
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        match flags & METHOD_ACCESS_MASK {
            0x1 => MemberAccess::Private,
            0x2 => MemberAccess::FamilyAndAssembly,
            0x3 => MemberAccess::Assembly,
            0x4 => MemberAccess::Family,
            0x5 => MemberAccess::FamilyOrAssembly,
            0x6 => MemberAccess::Public,
            // 0x7 is not defined; treat it like the unreferenceable default
            _ => MemberAccess::CompilerControlled,
        }
    }

    /// Raw access bits
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            MemberAccess::CompilerControlled => 0x0,
            MemberAccess::Private => 0x1,
            MemberAccess::FamilyAndAssembly => 0x2,
            MemberAccess::Assembly => 0x3,
            MemberAccess::Family => 0x4,
            MemberAccess::FamilyOrAssembly => 0x5,
            MemberAccess::Public => 0x6,
        }
    }

    /// True for access levels that publicizing widens to [`MemberAccess::Public`].
    ///
    /// Compiler-controlled members are not referenceable by name, so they are left alone.
    #[must_use]
    pub fn is_narrower_than_public(self) -> bool {
        !matches!(self, MemberAccess::Public | MemberAccess::CompilerControlled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_method_flags() {
        // public hidebysig newslot virtual final
        let flags = 0x01E6;
        assert_eq!(MemberAccess::from_method_flags(flags), MemberAccess::Public);

        let modifiers = MethodModifiers::from_method_flags(flags);
        assert!(modifiers.contains(MethodModifiers::VIRTUAL | MethodModifiers::FINAL));
        assert!(modifiers.contains(MethodModifiers::NEW_SLOT));
        assert_eq!(modifiers.bits() | MemberAccess::Public.bits(), flags);
    }

    #[test]
    fn access_round_trip() {
        for bits in 0..=6 {
            assert_eq!(MemberAccess::from_method_flags(bits).bits(), bits);
        }
        assert!(MemberAccess::Assembly.is_narrower_than_public());
        assert!(MemberAccess::Private.is_narrower_than_public());
        assert!(!MemberAccess::Public.is_narrower_than_public());
        assert!(!MemberAccess::CompilerControlled.is_narrower_than_public());
    }

    #[test]
    fn unknown_bits_survive() {
        let modifiers = MethodModifiers::from_method_flags(0x1_0000 | 0x0010);
        assert_eq!(modifiers.bits(), 0x1_0010);
    }
}
