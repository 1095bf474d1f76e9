//! Guest-visible property access: Get, Put, Delete, DefineOwnProperty,
//! HasProperty and the object-level lock-down operations.
//!
//! These sit on [`Realm`] rather than on the heap because accessors run
//! arbitrary functions, which need the whole realm.  Every failure described
//! as "fail" is a typed [`SesError`]; the single exception is Delete, whose
//! caller picks [`Strictness`] explicitly.

use std::rc::Rc;

use crate::error::SesError;
use crate::object_model::{
    LookupHit, ObjectKind, PropertyDescriptor, SlotKind, check_property_name,
};
use crate::realm::Realm;
use crate::value::{ObjectHandle, SesValue, is_numeric_name};

/// How Delete reports a non-configurable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Raise `NotConfigurable`.
    Strict,
    /// Return `Ok(false)`.
    Sloppy,
}

fn expect_object(value: &SesValue, operation: &'static str) -> Result<ObjectHandle, SesError> {
    value.as_object().ok_or(SesError::NotAnObject {
        operation,
        type_name: value.type_name(),
    })
}

fn check_name(name: &str) -> Result<(), SesError> {
    if is_numeric_name(name) {
        Ok(())
    } else {
        check_property_name(name)
    }
}

impl Realm {
    // -- Calls ----------------------------------------------------------------

    /// Invoke a function from guest context.  Unmarked functions are toxic.
    pub fn call(
        &mut self,
        func: &SesValue,
        this: SesValue,
        args: &[SesValue],
    ) -> Result<SesValue, SesError> {
        self.invoke(func, this, args, true)
    }

    /// Invoke a function from host context, marked or not.
    pub fn call_host(
        &mut self,
        func: &SesValue,
        this: SesValue,
        args: &[SesValue],
    ) -> Result<SesValue, SesError> {
        self.invoke(func, this, args, false)
    }

    fn invoke(
        &mut self,
        func: &SesValue,
        this: SesValue,
        args: &[SesValue],
        from_guest: bool,
    ) -> Result<SesValue, SesError> {
        let not_callable = || SesError::NotCallable(func.clone());
        let handle = func.as_object().ok_or_else(not_callable)?;
        let (name, marked, behavior) = match &self.heap.get(handle)?.kind {
            ObjectKind::Function(f) => (f.name.clone(), f.marked, Rc::clone(&f.behavior)),
            _ => return Err(not_callable()),
        };
        if from_guest && !marked {
            let err = SesError::ToxicFunction { name };
            self.emit(
                "object_protocol",
                "call",
                "toxic",
                Some(err.stable_code()),
                err.to_string(),
            );
            return Err(err);
        }
        // A missing receiver never reaches the behaviour as itself.
        let this = if matches!(this, SesValue::Undefined | SesValue::Null) {
            self.useless()
        } else {
            this
        };
        behavior(self, this, args)
    }

    // -- Get / Put ------------------------------------------------------------

    /// `[[Get]]`: numeric names read the raw element, accessors run their
    /// getter with `obj` as receiver, absent properties read as `Undefined`.
    pub fn get(&mut self, obj: &SesValue, name: &str) -> Result<SesValue, SesError> {
        let handle = expect_object(obj, "get")?;
        check_name(name)?;
        let Some((_, hit)) = self.heap.lookup(handle, name)? else {
            return Ok(SesValue::Undefined);
        };
        let slot = match hit {
            LookupHit::Element(value) => return Ok(value),
            LookupHit::Slot(slot) => slot,
        };
        match slot.kind {
            SlotKind::Data { value, .. } => Ok(value),
            SlotKind::Accessor { get: Some(getter), .. } => {
                self.call(&SesValue::Object(getter), obj.clone(), &[])
            }
            SlotKind::Accessor { get: None, .. } => Ok(SesValue::Undefined),
        }
    }

    /// `[[Put]]`.  Returns the written value.
    pub fn put(
        &mut self,
        obj: &SesValue,
        name: &str,
        value: SesValue,
    ) -> Result<SesValue, SesError> {
        let handle = expect_object(obj, "put")?;
        check_name(name)?;
        if is_numeric_name(name) {
            return self.put_element(handle, name, value);
        }
        let not_writable = || SesError::NotWritable {
            name: name.to_string(),
        };

        if let Some((owner, LookupHit::Slot(slot))) = self.heap.lookup(handle, name)? {
            match slot.kind {
                SlotKind::Accessor { set: Some(setter), .. } => {
                    self.call(&SesValue::Object(setter), obj.clone(), &[value.clone()])?;
                    return Ok(value);
                }
                SlotKind::Accessor { set: None, .. } | SlotKind::Data { writable: false, .. } => {
                    return Err(not_writable());
                }
                SlotKind::Data { writable: true, .. } if owner == handle => {
                    self.heap.get_mut(handle)?.write_data(name, value.clone());
                    return Ok(value);
                }
                // Writable inherited data slot: shadow it with an own slot.
                SlotKind::Data { .. } => {}
            }
        }

        let target = self.heap.get_mut(handle)?;
        if !target.is_extensible() {
            return Err(SesError::NotExtensible {
                name: name.to_string(),
            });
        }
        target.define_own_property(name, &PropertyDescriptor::data(value.clone()))?;
        Ok(value)
    }

    fn put_element(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        value: SesValue,
    ) -> Result<SesValue, SesError> {
        let target = self.heap.get_mut(handle)?;
        if !target.has_own_property(name) && !target.is_extensible() {
            return Err(SesError::NotExtensible {
                name: name.to_string(),
            });
        }
        if !target.numeric_writable() {
            return Err(SesError::NotWritable {
                name: name.to_string(),
            });
        }
        target.write_element(name, value.clone());
        Ok(value)
    }

    // -- Delete ---------------------------------------------------------------

    /// `[[Delete]]`.  Absent properties delete vacuously.
    pub fn delete_property(
        &mut self,
        obj: &SesValue,
        name: &str,
        strictness: Strictness,
    ) -> Result<bool, SesError> {
        let handle = expect_object(obj, "delete")?;
        check_name(name)?;
        if self.heap.get_mut(handle)?.delete(name) {
            return Ok(true);
        }
        match strictness {
            Strictness::Strict => Err(SesError::NotConfigurable {
                name: name.to_string(),
            }),
            Strictness::Sloppy => Ok(false),
        }
    }

    // -- Descriptors ----------------------------------------------------------

    pub fn define_own_property(
        &mut self,
        obj: &SesValue,
        name: &str,
        desc: &PropertyDescriptor,
    ) -> Result<(), SesError> {
        let handle = expect_object(obj, "define_own_property")?;
        self.heap.define_own_property(handle, name, desc)
    }

    /// Batch define.  Every name and descriptor is validated before any
    /// property is written.
    pub fn define_properties(
        &mut self,
        obj: &SesValue,
        props: &[(&str, PropertyDescriptor)],
    ) -> Result<(), SesError> {
        let handle = expect_object(obj, "define_properties")?;
        for (name, desc) in props {
            if is_numeric_name(name) {
                return Err(SesError::NumericRedefinition {
                    name: name.to_string(),
                });
            }
            check_property_name(name)?;
            desc.validate()?;
        }
        for (name, desc) in props {
            self.heap.define_own_property(handle, name, desc)?;
        }
        Ok(())
    }

    pub fn get_own_property_descriptor(
        &self,
        obj: &SesValue,
        name: &str,
    ) -> Result<Option<PropertyDescriptor>, SesError> {
        let handle = expect_object(obj, "get_own_property_descriptor")?;
        check_name(name)?;
        Ok(self.heap.get(handle)?.get_own_property(name))
    }

    pub fn has_own_property(&self, obj: &SesValue, name: &str) -> Result<bool, SesError> {
        let handle = expect_object(obj, "has_own_property")?;
        check_name(name)?;
        Ok(self.heap.get(handle)?.has_own_property(name))
    }

    /// `[[HasProperty]]`: own or inherited.
    pub fn has_property(&self, obj: &SesValue, name: &str) -> Result<bool, SesError> {
        let handle = expect_object(obj, "has_property")?;
        check_name(name)?;
        Ok(self.heap.lookup(handle, name)?.is_some())
    }

    // -- Object-level state ---------------------------------------------------

    pub fn prevent_extensions(&mut self, obj: &SesValue) -> Result<SesValue, SesError> {
        let handle = expect_object(obj, "prevent_extensions")?;
        self.heap.get_mut(handle)?.prevent_extensions();
        Ok(obj.clone())
    }

    pub fn seal(&mut self, obj: &SesValue) -> Result<SesValue, SesError> {
        let handle = expect_object(obj, "seal")?;
        self.heap.get_mut(handle)?.seal();
        Ok(obj.clone())
    }

    pub fn freeze(&mut self, obj: &SesValue) -> Result<SesValue, SesError> {
        let handle = expect_object(obj, "freeze")?;
        self.heap.get_mut(handle)?.freeze();
        Ok(obj.clone())
    }

    /// Primitives count as frozen.
    pub fn is_frozen(&self, obj: &SesValue) -> Result<bool, SesError> {
        match obj.as_object() {
            Some(handle) => Ok(self.heap.get(handle)?.is_frozen()),
            None => Ok(true),
        }
    }

    /// Primitives count as sealed.
    pub fn is_sealed(&self, obj: &SesValue) -> Result<bool, SesError> {
        match obj.as_object() {
            Some(handle) => Ok(self.heap.get(handle)?.is_sealed()),
            None => Ok(true),
        }
    }

    pub fn is_extensible(&self, obj: &SesValue) -> Result<bool, SesError> {
        match obj.as_object() {
            Some(handle) => Ok(self.heap.get(handle)?.is_extensible()),
            None => Ok(false),
        }
    }

    // -- Keys -----------------------------------------------------------------

    pub fn own_keys(&self, obj: &SesValue) -> Result<Vec<String>, SesError> {
        let handle = expect_object(obj, "own_keys")?;
        Ok(self.heap.get(handle)?.own_keys())
    }

    /// Enumerable own names: numeric names first in numeric order.
    pub fn keys(&self, obj: &SesValue) -> Result<Vec<String>, SesError> {
        let handle = expect_object(obj, "keys")?;
        Ok(self.heap.get(handle)?.own_enumerable_keys())
    }

    // -- Prototypes -----------------------------------------------------------

    /// New ordinary object inheriting from `proto` (`None`/`Null` for none).
    pub fn create_object(&mut self, proto: Option<&SesValue>) -> Result<SesValue, SesError> {
        let proto = match proto {
            None | Some(SesValue::Null) => None,
            Some(p) => Some(expect_object(p, "create_object")?),
        };
        if let Some(p) = proto {
            let depth = self.heap.chain(p)?.len() as u32;
            let max = self.heap.max_prototype_depth();
            if depth > max {
                return Err(SesError::PrototypeChainTooDeep {
                    depth: depth + 1,
                    max,
                });
            }
        }
        Ok(SesValue::Object(self.heap.alloc(ObjectKind::Ordinary, proto)))
    }

    pub fn get_prototype_of(&self, obj: &SesValue) -> Result<SesValue, SesError> {
        let handle = expect_object(obj, "get_prototype_of")?;
        Ok(self
            .heap
            .get(handle)?
            .prototype
            .map_or(SesValue::Null, SesValue::Object))
    }

    pub fn set_prototype_of(&mut self, obj: &SesValue, proto: &SesValue) -> Result<(), SesError> {
        let handle = expect_object(obj, "set_prototype_of")?;
        let proto = match proto {
            SesValue::Null => None,
            p => Some(expect_object(p, "set_prototype_of")?),
        };
        self.heap.set_prototype_of(handle, proto)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::object_model::DEFAULT_MAX_PROTOTYPE_DEPTH;
    use crate::realm::RealmConfig;

    fn n(v: i32) -> SesValue {
        SesValue::from(v)
    }

    #[test]
    fn missing_receiver_becomes_useless() {
        let mut realm = Realm::new();
        let f = realm.new_function("whoami", |_, this, _| Ok(this));
        let useless = realm.useless();
        assert_eq!(realm.call(&f, SesValue::Undefined, &[]).unwrap(), useless);
        assert_eq!(realm.call_host(&f, SesValue::Null, &[]).unwrap(), useless);
        let o = realm.new_record();
        assert_eq!(realm.call(&f, o.clone(), &[]).unwrap(), o);
        assert_eq!(realm.call(&f, n(3), &[]).unwrap(), n(3));
    }

    #[test]
    fn has_own_property_rejects_reserved_names() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        assert!(matches!(
            realm.has_own_property(&o, "secret__"),
            Err(SesError::ReservedPropertyName { .. })
        ));
        assert!(!realm.has_own_property(&o, "secret").unwrap());
        assert!(!realm.has_own_property(&o, "0").unwrap());
    }

    #[test]
    fn put_creates_full_access_data_slot() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        realm.put(&o, "x", n(1)).unwrap();
        let desc = realm.get_own_property_descriptor(&o, "x").unwrap().unwrap();
        assert_eq!(desc, PropertyDescriptor::data(n(1)));
    }

    #[test]
    fn put_records_fastpath_marker() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        realm.put(&o, "x", n(1)).unwrap();
        let h = o.as_object().unwrap();
        assert!(!realm.heap().get(h).unwrap().slot("x").unwrap().fastpath_write);
        realm.put(&o, "x", n(2)).unwrap();
        assert!(realm.heap().get(h).unwrap().slot("x").unwrap().fastpath_write);
        realm
            .define_own_property(&o, "x", &PropertyDescriptor::default().with_enumerable(false))
            .unwrap();
        assert!(!realm.heap().get(h).unwrap().slot("x").unwrap().fastpath_write);
    }

    #[test]
    fn put_rejects_read_only_and_non_extensible() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        realm
            .define_own_property(&o, "ro", &PropertyDescriptor::data_frozen(n(1)))
            .unwrap();
        assert!(matches!(
            realm.put(&o, "ro", n(2)),
            Err(SesError::NotWritable { .. })
        ));
        realm.prevent_extensions(&o).unwrap();
        assert!(matches!(
            realm.put(&o, "fresh", n(2)),
            Err(SesError::NotExtensible { .. })
        ));
    }

    #[test]
    fn put_rejects_reserved_names() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        assert!(matches!(
            realm.put(&o, "x___", n(1)),
            Err(SesError::ReservedPropertyName { .. })
        ));
    }

    #[test]
    fn accessor_get_and_set_run_functions() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        realm.put(&o, "_x", n(10)).unwrap();
        let getter = realm.new_function("getX", |realm, this, _| realm.get(&this, "_x"));
        let setter = realm.new_function("setX", |realm, this, args| {
            let v = args.first().cloned().unwrap_or(SesValue::Undefined);
            realm.put(&this, "_x", v)
        });
        let desc = PropertyDescriptor::accessor(getter.as_object(), setter.as_object())
            .with_enumerable(true)
            .with_configurable(true);
        realm.define_own_property(&o, "x", &desc).unwrap();
        assert_eq!(realm.get(&o, "x").unwrap(), n(10));
        realm.put(&o, "x", n(11)).unwrap();
        assert_eq!(realm.get(&o, "_x").unwrap(), n(11));
    }

    #[test]
    fn accessor_without_setter_is_not_writable() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        let getter = realm.new_function("g", |_, _, _| Ok(n(1)));
        realm
            .define_own_property(&o, "x", &PropertyDescriptor::accessor(getter.as_object(), None))
            .unwrap();
        assert!(matches!(
            realm.put(&o, "x", n(2)),
            Err(SesError::NotWritable { .. })
        ));
    }

    #[test]
    fn unmarked_getter_is_toxic() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        let getter = realm.new_unmarked_function("hostOnly", move |_, _, _| {
            seen.set(seen.get() + 1);
            Ok(SesValue::Undefined)
        });
        realm
            .define_own_property(&o, "x", &PropertyDescriptor::accessor(getter.as_object(), None))
            .unwrap();
        let err = realm.get(&o, "x").unwrap_err();
        assert!(err.is_uncatchable());
        assert_eq!(hits.get(), 0);
        realm.call_host(&getter, SesValue::Undefined, &[]).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn call_rejects_non_functions() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        assert!(matches!(
            realm.call(&o, SesValue::Undefined, &[]),
            Err(SesError::NotCallable(_))
        ));
        assert!(matches!(
            realm.call(&n(1), SesValue::Undefined, &[]),
            Err(SesError::NotCallable(_))
        ));
    }

    #[test]
    fn numeric_put_follows_shared_policy() {
        let mut realm = Realm::new();
        let a = realm.new_array(vec![n(1), n(2)]).unwrap();
        realm.put(&a, "0", n(5)).unwrap();
        assert_eq!(realm.get(&a, "0").unwrap(), n(5));
        realm.seal(&a).unwrap();
        realm.put(&a, "1", n(6)).unwrap();
        assert!(matches!(
            realm.put(&a, "2", n(7)),
            Err(SesError::NotExtensible { .. })
        ));
        realm.freeze(&a).unwrap();
        assert!(matches!(
            realm.put(&a, "0", n(8)),
            Err(SesError::NotWritable { .. })
        ));
        assert_eq!(realm.get(&a, "1").unwrap(), n(6));
    }

    #[test]
    fn numeric_define_is_rejected() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        assert!(matches!(
            realm.define_own_property(&o, "0", &PropertyDescriptor::data(n(1))),
            Err(SesError::NumericRedefinition { .. })
        ));
    }

    #[test]
    fn delete_strict_and_sloppy() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        realm
            .define_own_property(&o, "k", &PropertyDescriptor::data_frozen(n(1)))
            .unwrap();
        assert_eq!(
            realm.delete_property(&o, "k", Strictness::Sloppy).unwrap(),
            false
        );
        assert!(matches!(
            realm.delete_property(&o, "k", Strictness::Strict),
            Err(SesError::NotConfigurable { .. })
        ));
        assert!(realm.delete_property(&o, "nope", Strictness::Strict).unwrap());
    }

    #[test]
    fn inherited_properties() {
        let mut realm = Realm::new();
        let proto = realm.new_record();
        realm.put(&proto, "shared", n(1)).unwrap();
        realm
            .define_own_property(&proto, "locked", &PropertyDescriptor::data_frozen(n(2)))
            .unwrap();
        let child = realm.create_object(Some(&proto)).unwrap();
        assert!(realm.has_property(&child, "shared").unwrap());
        assert!(!realm.has_own_property(&child, "shared").unwrap());
        assert_eq!(realm.get(&child, "shared").unwrap(), n(1));

        // Writable inherited slot is shadowed, not overwritten.
        realm.put(&child, "shared", n(3)).unwrap();
        assert_eq!(realm.get(&proto, "shared").unwrap(), n(1));
        assert_eq!(realm.get(&child, "shared").unwrap(), n(3));

        // Read-only inherited slot blocks the write.
        assert!(matches!(
            realm.put(&child, "locked", n(4)),
            Err(SesError::NotWritable { .. })
        ));
        assert_eq!(realm.get_prototype_of(&child).unwrap(), proto);
    }

    #[test]
    fn create_object_depth_limit() {
        let mut realm = Realm::with_config(RealmConfig {
            max_prototype_depth: 2,
            ..RealmConfig::default()
        });
        let a = realm.create_object(None).unwrap();
        let b = realm.create_object(Some(&a)).unwrap();
        let c = realm.create_object(Some(&b)).unwrap();
        assert!(matches!(
            realm.create_object(Some(&c)),
            Err(SesError::PrototypeChainTooDeep { max: 2, .. })
        ));
        assert_eq!(realm.config().max_prototype_depth, 2);
        assert_ne!(DEFAULT_MAX_PROTOTYPE_DEPTH, 2);
    }

    #[test]
    fn set_prototype_rejects_cycles() {
        let mut realm = Realm::new();
        let a = realm.create_object(None).unwrap();
        let b = realm.create_object(Some(&a)).unwrap();
        assert_eq!(
            realm.set_prototype_of(&a, &b),
            Err(SesError::PrototypeCycleDetected)
        );
        realm.set_prototype_of(&b, &SesValue::Null).unwrap();
        assert_eq!(realm.get_prototype_of(&b).unwrap(), SesValue::Null);
    }

    #[test]
    fn define_properties_validates_before_writing() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        let err = realm
            .define_properties(
                &o,
                &[
                    ("a", PropertyDescriptor::data(n(1))),
                    ("b__", PropertyDescriptor::data(n(2))),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, SesError::ReservedPropertyName { .. }));
        assert!(!realm.has_own_property(&o, "a").unwrap());

        realm
            .define_properties(
                &o,
                &[
                    ("a", PropertyDescriptor::data(n(1))),
                    ("b", PropertyDescriptor::data(n(2)).with_enumerable(false)),
                ],
            )
            .unwrap();
        assert_eq!(realm.keys(&o).unwrap(), vec!["a"]);
        assert_eq!(realm.own_keys(&o).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn primitive_receivers() {
        let mut realm = Realm::new();
        assert!(matches!(
            realm.get(&n(1), "x"),
            Err(SesError::NotAnObject {
                operation: "get",
                ..
            })
        ));
        assert!(realm.is_frozen(&n(1)).unwrap());
        assert!(realm.is_sealed(&SesValue::Null).unwrap());
        assert!(!realm.is_extensible(&SesValue::from("s")).unwrap());
        assert!(realm.freeze(&n(1)).is_err());
    }

    #[test]
    fn lifecycle_ops_are_idempotent() {
        let mut realm = Realm::new();
        let o = realm.new_record();
        realm.put(&o, "a", n(1)).unwrap();
        realm.seal(&o).unwrap();
        let once = realm.get_own_property_descriptor(&o, "a").unwrap();
        realm.seal(&o).unwrap();
        assert_eq!(realm.get_own_property_descriptor(&o, "a").unwrap(), once);
        assert!(realm.is_sealed(&o).unwrap());
        assert!(!realm.is_frozen(&o).unwrap());
        realm.freeze(&o).unwrap();
        realm.freeze(&o).unwrap();
        assert!(realm.is_frozen(&o).unwrap());
        assert!(!realm.is_extensible(&o).unwrap());
    }
}
