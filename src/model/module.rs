use crate::{
    model::flags::{MemberAccess, MethodModifiers, TypeAttributes},
    Error::OutOfBounds,
    Result,
};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            /// Zero-based position of the item in its module
            #[must_use]
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

define_id!(
    /// Handle of a type within its [`Module`]
    TypeId
);
define_id!(
    /// Handle of a method within its [`Module`]
    MethodId
);
define_id!(
    /// Handle of a property within its [`Module`]
    PropertyId
);
define_id!(
    /// Handle of an event within its [`Module`]
    EventId
);

/// A type definition.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeDef {
    /// Namespace, empty for nested types and the global type
    pub namespace: String,
    /// Simple name
    pub name: String,
    flags: u32,
    enclosing: Option<TypeId>,
    methods: Vec<MethodId>,
    properties: Vec<PropertyId>,
    events: Vec<EventId>,
}

impl TypeDef {
    /// Raw `TypeAttributes`
    #[must_use]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// True if the type can not be derived from
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags & TypeAttributes::SEALED != 0
    }

    /// Set or clear the sealed flag, leaving all other bits untouched
    pub fn set_sealed(&mut self, sealed: bool) {
        if sealed {
            self.flags |= TypeAttributes::SEALED;
        } else {
            self.flags &= !TypeAttributes::SEALED;
        }
    }

    /// The enclosing type of a nested type
    #[must_use]
    pub fn enclosing(&self) -> Option<TypeId> {
        self.enclosing
    }

    /// Methods declared by this type, in declaration order
    #[must_use]
    pub fn methods(&self) -> &[MethodId] {
        &self.methods
    }

    /// Properties declared by this type, in declaration order
    #[must_use]
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }

    /// Events declared by this type, in declaration order
    #[must_use]
    pub fn events(&self) -> &[EventId] {
        &self.events
    }
}

/// A method definition.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodDef {
    /// Simple name
    pub name: String,
    flags: u32,
}

impl MethodDef {
    /// Raw `MethodAttributes`
    #[must_use]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Access level
    #[must_use]
    pub fn access(&self) -> MemberAccess {
        MemberAccess::from_method_flags(self.flags)
    }

    /// All bits other than the access level
    #[must_use]
    pub fn modifiers(&self) -> MethodModifiers {
        MethodModifiers::from_method_flags(self.flags)
    }

    /// Replace the access level, keeping all modifier bits
    pub fn set_access(&mut self, access: MemberAccess) {
        self.flags = self.modifiers().bits() | access.bits();
    }

    /// Replace the modifier bits, keeping the access level
    pub fn set_modifiers(&mut self, modifiers: MethodModifiers) {
        self.flags = modifiers.bits() | self.access().bits();
    }

    /// True for instance (`.ctor`) and type (`.cctor`) initializers
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.modifiers().contains(MethodModifiers::RTSPECIAL_NAME)
            && (self.name == ".ctor" || self.name == ".cctor")
    }
}

/// A property and its accessor methods.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDef {
    /// Simple name
    pub name: String,
    /// The `get` accessor
    pub getter: Option<MethodId>,
    /// The `set` accessor
    pub setter: Option<MethodId>,
}

impl PropertyDef {
    /// Accessors in getter, setter order
    pub fn accessors(&self) -> impl Iterator<Item = MethodId> {
        [self.getter, self.setter].into_iter().flatten()
    }
}

/// An event and its accessor methods.
#[derive(Clone, Debug, PartialEq)]
pub struct EventDef {
    /// Simple name
    pub name: String,
    /// The `add` accessor
    pub add: Option<MethodId>,
    /// The `remove` accessor
    pub remove: Option<MethodId>,
    /// The `raise` (fire) accessor
    pub raise: Option<MethodId>,
}

impl EventDef {
    /// Accessors in add, remove, raise order
    pub fn accessors(&self) -> impl Iterator<Item = MethodId> {
        [self.add, self.remove, self.raise].into_iter().flatten()
    }
}

/// The editable view of one compiled module.
///
/// A module is loaded by a [`crate::backend::ModuleBackend`], mutated in place by the patch
/// rules and handed back to the backend to be written. Items are addressed by the ids returned
/// when they were added; the ids of a loaded module follow the row order of its metadata.
///
/// # Examples
///
/// ```rust
/// use dotpatch::model::{Module, TypeAttributes};
///
/// let mut module = Module::new("Core");
/// let outer = module.add_type("MyApp", "Outer", TypeAttributes::PUBLIC);
/// let inner = module.add_nested_type(outer, "Inner", TypeAttributes::NESTED_PUBLIC | TypeAttributes::SEALED)?;
///
/// assert_eq!(module.full_name(inner), "MyApp.Outer/Inner");
/// assert!(module.type_def(inner).is_some_and(|ty| ty.is_sealed()));
/// # Ok::<(), dotpatch::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    name: String,
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    properties: Vec<PropertyDef>,
    events: Vec<EventDef>,
    internals_visible_to: Vec<String>,
    added_internals_visible_to: Vec<String>,
}

impl Module {
    /// Create an empty module for the assembly `name`
    #[must_use]
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            ..Module::default()
        }
    }

    /// Simple name of the assembly this module defines
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a top-level type
    pub fn add_type(&mut self, namespace: &str, name: &str, flags: u32) -> TypeId {
        self.types.push(TypeDef {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            enclosing: None,
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
        });
        TypeId(self.types.len() - 1)
    }

    /// Add a type nested in `enclosing`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `enclosing` is not a type of this module.
    pub fn add_nested_type(&mut self, enclosing: TypeId, name: &str, flags: u32) -> Result<TypeId> {
        self.check_type(enclosing)?;
        let id = self.add_type("", name, flags);
        self.types[id.0].enclosing = Some(enclosing);
        Ok(id)
    }

    /// Mark `nested` as nested in `enclosing`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if either id is not a type of this module.
    pub fn set_enclosing(&mut self, nested: TypeId, enclosing: TypeId) -> Result<()> {
        self.check_type(enclosing)?;
        let ty = self.types.get_mut(nested.0).ok_or(OutOfBounds)?;
        ty.enclosing = Some(enclosing);
        Ok(())
    }

    /// Add a method declared by `owner`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `owner` is not a type of this module.
    pub fn add_method(&mut self, owner: TypeId, name: &str, flags: u32) -> Result<MethodId> {
        self.check_type(owner)?;
        self.methods.push(MethodDef {
            name: name.to_string(),
            flags,
        });
        let id = MethodId(self.methods.len() - 1);
        self.types[owner.0].methods.push(id);
        Ok(id)
    }

    /// Add a property declared by `owner`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `owner` or an accessor is unknown.
    pub fn add_property(
        &mut self,
        owner: TypeId,
        name: &str,
        getter: Option<MethodId>,
        setter: Option<MethodId>,
    ) -> Result<PropertyId> {
        self.check_type(owner)?;
        self.check_methods(&[getter, setter])?;
        self.properties.push(PropertyDef {
            name: name.to_string(),
            getter,
            setter,
        });
        let id = PropertyId(self.properties.len() - 1);
        self.types[owner.0].properties.push(id);
        Ok(id)
    }

    /// Add an event declared by `owner`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `owner` or an accessor is unknown.
    pub fn add_event(
        &mut self,
        owner: TypeId,
        name: &str,
        add: Option<MethodId>,
        remove: Option<MethodId>,
        raise: Option<MethodId>,
    ) -> Result<EventId> {
        self.check_type(owner)?;
        self.check_methods(&[add, remove, raise])?;
        self.events.push(EventDef {
            name: name.to_string(),
            add,
            remove,
            raise,
        });
        let id = EventId(self.events.len() - 1);
        self.types[owner.0].events.push(id);
        Ok(id)
    }

    fn check_type(&self, id: TypeId) -> Result<()> {
        if id.0 < self.types.len() {
            Ok(())
        } else {
            Err(OutOfBounds)
        }
    }

    fn check_methods(&self, ids: &[Option<MethodId>]) -> Result<()> {
        if ids.iter().flatten().all(|id| id.0 < self.methods.len()) {
            Ok(())
        } else {
            Err(OutOfBounds)
        }
    }

    /// Ids of all types, in definition order
    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId)
    }

    /// Number of types
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of methods
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Look up a type
    #[must_use]
    pub fn type_def(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id.0)
    }

    /// Look up a type for editing
    pub fn type_def_mut(&mut self, id: TypeId) -> Option<&mut TypeDef> {
        self.types.get_mut(id.0)
    }

    /// Look up a method
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&MethodDef> {
        self.methods.get(id.0)
    }

    /// Look up a method for editing
    pub fn method_mut(&mut self, id: MethodId) -> Option<&mut MethodDef> {
        self.methods.get_mut(id.0)
    }

    /// Look up a property
    #[must_use]
    pub fn property(&self, id: PropertyId) -> Option<&PropertyDef> {
        self.properties.get(id.0)
    }

    /// Look up an event
    #[must_use]
    pub fn event(&self, id: EventId) -> Option<&EventDef> {
        self.events.get(id.0)
    }

    /// Find a type by its full name
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<TypeId> {
        self.type_ids().find(|id| self.full_name(*id) == full_name)
    }

    /// The full name of a type: `Namespace.Name` for top-level types, `Outer/Inner` for nested
    /// types. Unknown ids yield an empty string.
    #[must_use]
    pub fn full_name(&self, id: TypeId) -> String {
        let mut chain = Vec::new();
        let mut current = Some(id);
        // A malformed module could declare a nesting cycle
        while let Some(ty_id) = current {
            let Some(ty) = self.types.get(ty_id.0) else {
                break;
            };
            if chain.len() > self.types.len() {
                break;
            }
            chain.push(ty);
            current = ty.enclosing;
        }

        let mut name = String::new();
        for (position, ty) in chain.iter().rev().enumerate() {
            if position > 0 {
                name.push('/');
            }
            if !ty.namespace.is_empty() {
                name.push_str(&ty.namespace);
                name.push('.');
            }
            name.push_str(&ty.name);
        }
        name
    }

    /// All `InternalsVisibleTo` friends: those present when the module was loaded, followed by
    /// those added since.
    pub fn internals_visible_to(&self) -> impl Iterator<Item = &str> {
        self.internals_visible_to
            .iter()
            .chain(&self.added_internals_visible_to)
            .map(String::as_str)
    }

    /// Friends added since the module was loaded, in order
    #[must_use]
    pub fn added_internals_visible_to(&self) -> &[String] {
        &self.added_internals_visible_to
    }

    /// Add an assembly-level `InternalsVisibleTo` marker for `friend`. Duplicates are kept.
    pub fn add_internals_visible_to(&mut self, friend: &str) {
        self.added_internals_visible_to.push(friend.to_string());
    }

    /// Record a marker that is already part of the stored module
    pub(crate) fn record_internals_visible_to(&mut self, friend: &str) {
        self.internals_visible_to.push(friend.to_string());
    }

    /// Treat every added marker as stored, once the module has been persisted
    pub(crate) fn commit_internals_visible_to(&mut self) {
        let added = std::mem::take(&mut self.added_internals_visible_to);
        self.internals_visible_to.extend(added);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_names() {
        let mut module = Module::new("Core");
        let outer = module.add_type("MyApp", "Outer", TypeAttributes::PUBLIC);
        let inner = module
            .add_nested_type(outer, "Inner", TypeAttributes::NESTED_PUBLIC)
            .unwrap();
        let deepest = module
            .add_nested_type(inner, "Deepest", TypeAttributes::NESTED_PRIVATE)
            .unwrap();
        let global = module.add_type("", "<Module>", 0);

        assert_eq!(module.full_name(outer), "MyApp.Outer");
        assert_eq!(module.full_name(deepest), "MyApp.Outer/Inner/Deepest");
        assert_eq!(module.full_name(global), "<Module>");
        assert_eq!(module.find_type("MyApp.Outer/Inner"), Some(inner));
    }

    #[test]
    fn nesting_cycle_terminates() {
        let mut module = Module::new("Core");
        let a = module.add_type("", "A", 0);
        let b = module.add_type("", "B", 0);
        module.set_enclosing(a, b).unwrap();
        module.set_enclosing(b, a).unwrap();

        // Any finite answer is fine, it just must not hang
        assert!(!module.full_name(a).is_empty());
    }

    #[test]
    fn members() {
        let mut module = Module::new("Core");
        let ty = module.add_type("MyApp", "Service", TypeAttributes::PUBLIC);
        let getter = module.add_method(ty, "get_Name", 0x0886).unwrap();
        let setter = module.add_method(ty, "set_Name", 0x0883).unwrap();
        let property = module
            .add_property(ty, "Name", Some(getter), Some(setter))
            .unwrap();

        let accessors: Vec<_> = module.property(property).unwrap().accessors().collect();
        assert_eq!(accessors, vec![getter, setter]);
        assert_eq!(module.type_def(ty).unwrap().methods(), &[getter, setter]);

        assert!(module.add_method(TypeId(9), "Missing", 0).is_err());
        assert!(module
            .add_property(ty, "Broken", Some(MethodId(42)), None)
            .is_err());
    }

    #[test]
    fn method_flags() {
        let mut module = Module::new("Core");
        let ty = module.add_type("MyApp", "Service", TypeAttributes::PUBLIC);
        let ctor = module.add_method(ty, ".ctor", 0x1886).unwrap();
        let run = module.add_method(ty, "Run", 0x00E3).unwrap();

        assert!(module.method(ctor).unwrap().is_constructor());

        let method = module.method_mut(run).unwrap();
        assert!(!method.is_constructor());
        assert_eq!(method.access(), MemberAccess::Assembly);

        method.set_access(MemberAccess::Public);
        assert_eq!(method.flags(), 0x00E6);

        method.set_modifiers(method.modifiers() - MethodModifiers::FINAL);
        assert_eq!(method.flags(), 0x00C6);
    }

    #[test]
    fn internals_visible_to() {
        let mut module = Module::new("Core");
        module.record_internals_visible_to("Core.Benchmarks");
        module.add_internals_visible_to("Core.Tests");
        module.add_internals_visible_to("Core.Tests");

        assert_eq!(module.added_internals_visible_to().len(), 2);
        assert_eq!(
            module.internals_visible_to().collect::<Vec<_>>(),
            vec!["Core.Benchmarks", "Core.Tests", "Core.Tests"]
        );

        module.commit_internals_visible_to();
        assert!(module.added_internals_visible_to().is_empty());
        assert_eq!(module.internals_visible_to().count(), 3);
    }

    #[test]
    fn sealed_flag() {
        let mut module = Module::new("Core");
        let ty = module.add_type(
            "MyApp",
            "FooOptions",
            TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::BEFORE_FIELD_INIT,
        );

        let def = module.type_def_mut(ty).unwrap();
        assert!(def.is_sealed());
        def.set_sealed(false);
        assert_eq!(
            def.flags(),
            TypeAttributes::PUBLIC | TypeAttributes::BEFORE_FIELD_INIT
        );
    }
}
