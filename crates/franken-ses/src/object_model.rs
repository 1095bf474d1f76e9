//! Property-attribute object model.
//!
//! Each heap object carries:
//!
//! - **Named slots**: an explicit map from property name to a
//!   [`PropertySlot`] (data or accessor, plus enumerable/configurable bits).
//! - **Numeric elements**: numeric-indexed values that all share a single
//!   [`NumericPolicy`] per object instead of per-name descriptors.
//! - **Object-level state**: `extensible` and a cached `frozen` flag.  Both
//!   transitions are one-directional.
//! - **Side tables**: per-table entries attached to the object by
//!   key-lifetime identity tables; never visible as properties.
//!
//! The algorithms here are pure slot manipulation.  Anything that may run
//! guest code (getters, setters) lives in `object_protocol`, which layers
//! Get/Put/HasProperty on top of this module.
//!
//! `BTreeMap` keeps key iteration deterministic.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::SesError;
use crate::guard::{Guard, StampCapability};
use crate::identity_table::TableId;
use crate::realm::Realm;
use crate::value::{ObjectHandle, SesValue, is_numeric_name, is_reserved_name};

/// Maximum prototype chain depth to prevent runaway walks.
pub const DEFAULT_MAX_PROTOTYPE_DEPTH: u32 = 1024;

/// Reject names that collide with the reserved attribute-encoding suffix.
pub fn check_property_name(name: &str) -> Result<(), SesError> {
    if is_reserved_name(name) {
        return Err(SesError::ReservedPropertyName {
            name: name.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Native behaviour backing a function object: `(realm, this, args)`.
pub type NativeFn = Rc<dyn Fn(&mut Realm, SesValue, &[SesValue]) -> Result<SesValue, SesError>>;

/// A callable heap object.
///
/// Only *marked* functions may be invoked through the object protocol;
/// calling an unmarked one is an uncatchable toxic-function fault.
#[derive(Clone)]
pub struct FunctionObject {
    pub name: String,
    pub marked: bool,
    pub(crate) behavior: NativeFn,
}

impl fmt::Debug for FunctionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionObject")
            .field("name", &self.name)
            .field("marked", &self.marked)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ObjectKind
// ---------------------------------------------------------------------------

/// What an object is, beyond its properties.
#[derive(Clone)]
pub enum ObjectKind {
    /// Plain aggregate with no behaviour beyond its own properties.
    Record,
    /// Plain aggregate used for list-like data (JSON arrays).
    Array,
    /// Object created with an explicit host-provided prototype.
    Ordinary,
    Function(FunctionObject),
    /// Identity with only a diagnostic name.
    Token { name: String },
    Guard(Rc<dyn Guard>),
    Stamp(Rc<StampCapability>),
}

impl ObjectKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Array => "array",
            Self::Ordinary => "object",
            Self::Function(_) => "function",
            Self::Token { .. } => "token",
            Self::Guard(_) => "guard",
            Self::Stamp(_) => "stamp",
        }
    }
}

impl fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(func) => write!(f, "Function({})", func.name),
            Self::Token { name } => write!(f, "Token({name})"),
            Self::Guard(g) => write!(f, "Guard({})", g.name()),
            Self::Stamp(s) => write!(f, "Stamp({})", s.typename()),
            other => f.write_str(other.label()),
        }
    }
}

// ---------------------------------------------------------------------------
// PropertySlot
// ---------------------------------------------------------------------------

/// A slot is either data or accessor, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlotKind {
    Data { value: SesValue, writable: bool },
    Accessor {
        get: Option<ObjectHandle>,
        set: Option<ObjectHandle>,
    },
}

/// Full attribute state of one named own property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySlot {
    pub kind: SlotKind,
    pub enumerable: bool,
    pub configurable: bool,
    /// Set by `Put` after a successful direct write; cleared by any redefinition.
    pub fastpath_write: bool,
}

impl PropertySlot {
    pub fn is_data(&self) -> bool {
        matches!(self.kind, SlotKind::Data { .. })
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self.kind, SlotKind::Accessor { .. })
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.kind, SlotKind::Data { writable: true, .. })
    }

    pub fn value(&self) -> Option<&SesValue> {
        match &self.kind {
            SlotKind::Data { value, .. } => Some(value),
            SlotKind::Accessor { .. } => None,
        }
    }

    pub fn getter(&self) -> Option<ObjectHandle> {
        match self.kind {
            SlotKind::Accessor { get, .. } => get,
            SlotKind::Data { .. } => None,
        }
    }

    pub fn setter(&self) -> Option<ObjectHandle> {
        match self.kind {
            SlotKind::Accessor { set, .. } => set,
            SlotKind::Data { .. } => None,
        }
    }

    /// Build a fresh slot, filling absent fields with the global defaults.
    fn from_descriptor(desc: &PropertyDescriptor) -> Self {
        let kind = if desc.is_accessor_descriptor() {
            SlotKind::Accessor {
                get: desc.get.as_ref().and_then(SesValue::as_object),
                set: desc.set.as_ref().and_then(SesValue::as_object),
            }
        } else {
            SlotKind::Data {
                value: desc.value.clone().unwrap_or(SesValue::Undefined),
                writable: desc.writable.unwrap_or(false),
            }
        };
        Self {
            kind,
            enumerable: desc.enumerable.unwrap_or(false),
            configurable: desc.configurable.unwrap_or(false),
            fastpath_write: false,
        }
    }

    /// Merge the present fields of `desc` over `self`.
    fn apply(&mut self, desc: &PropertyDescriptor) {
        match &mut self.kind {
            SlotKind::Data { value, writable } => {
                if let Some(v) = &desc.value {
                    *value = v.clone();
                }
                if let Some(w) = desc.writable {
                    *writable = w;
                }
            }
            SlotKind::Accessor { get, set } => {
                if let Some(g) = &desc.get {
                    *get = g.as_object();
                }
                if let Some(s) = &desc.set {
                    *set = s.as_object();
                }
            }
        }
        if let Some(e) = desc.enumerable {
            self.enumerable = e;
        }
        if let Some(c) = desc.configurable {
            self.configurable = c;
        }
        self.fastpath_write = false;
    }
}

/// The single descriptor shared by all numeric-indexed slots of an object.
///
/// Numeric slots are always enumerable data slots.  An object without a
/// policy behaves as `{writable: true, configurable: true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericPolicy {
    pub writable: bool,
    pub configurable: bool,
}

impl Default for NumericPolicy {
    fn default() -> Self {
        Self {
            writable: true,
            configurable: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

/// Transient descriptor used to read or write a slot's state atomically.
///
/// Every field is optional: `None` means "absent" (not the same as a present
/// `Undefined`).  `get`/`set` hold `Undefined` or a function object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub value: Option<SesValue>,
    pub writable: Option<bool>,
    pub get: Option<SesValue>,
    pub set: Option<SesValue>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// Data descriptor with every attribute granted.
    pub fn data(value: SesValue) -> Self {
        Self {
            value: Some(value),
            writable: Some(true),
            enumerable: Some(true),
            configurable: Some(true),
            ..Self::default()
        }
    }

    /// Data descriptor with every attribute denied.
    pub fn data_frozen(value: SesValue) -> Self {
        Self {
            value: Some(value),
            writable: Some(false),
            enumerable: Some(false),
            configurable: Some(false),
            ..Self::default()
        }
    }

    /// Accessor descriptor; attribute bits stay absent.
    pub fn accessor(get: Option<ObjectHandle>, set: Option<ObjectHandle>) -> Self {
        Self {
            get: Some(get.map_or(SesValue::Undefined, SesValue::Object)),
            set: Some(set.map_or(SesValue::Undefined, SesValue::Object)),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: SesValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }

    pub fn with_enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = Some(enumerable);
        self
    }

    pub fn with_configurable(mut self, configurable: bool) -> Self {
        self.configurable = Some(configurable);
        self
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_generic_descriptor(&self) -> bool {
        !self.is_accessor_descriptor() && !self.is_data_descriptor()
    }

    /// Every field absent.
    pub fn is_empty(&self) -> bool {
        self.is_generic_descriptor() && self.enumerable.is_none() && self.configurable.is_none()
    }

    /// Shape checks that need no heap access.
    pub fn validate(&self) -> Result<(), SesError> {
        if self.is_accessor_descriptor() && self.is_data_descriptor() {
            return Err(SesError::InvalidDescriptor {
                reason: "accessor properties must not have a value or be writable".to_string(),
            });
        }
        for (field, v) in [("get", &self.get), ("set", &self.set)] {
            if let Some(v) = v
                && !matches!(v, SesValue::Undefined | SesValue::Object(_))
            {
                return Err(SesError::InvalidDescriptor {
                    reason: format!("{field}ter attributes must be functions or undefined"),
                });
            }
        }
        Ok(())
    }

    /// Fully populated descriptor for an existing slot.
    pub fn from_slot(slot: &PropertySlot) -> Self {
        let mut desc = Self {
            enumerable: Some(slot.enumerable),
            configurable: Some(slot.configurable),
            ..Self::default()
        };
        match &slot.kind {
            SlotKind::Data { value, writable } => {
                desc.value = Some(value.clone());
                desc.writable = Some(*writable);
            }
            SlotKind::Accessor { get, set } => {
                desc.get = Some(get.map_or(SesValue::Undefined, SesValue::Object));
                desc.set = Some(set.map_or(SesValue::Undefined, SesValue::Object));
            }
        }
        desc
    }

    /// Does every present field already hold the same value in `current`?
    ///
    /// Comparison uses SameValue, so a `NaN` value matches itself and `-0`
    /// does not match `+0`.  A field absent from `current` never matches.
    pub fn matches(&self, current: &PropertyDescriptor) -> bool {
        fn same_value(want: &Option<SesValue>, have: &Option<SesValue>) -> bool {
            match (want, have) {
                (None, _) => true,
                (Some(w), Some(h)) => w.same_value(h),
                (Some(_), None) => false,
            }
        }
        fn same_bit(want: Option<bool>, have: Option<bool>) -> bool {
            want.is_none() || want == have
        }
        same_value(&self.value, &current.value)
            && same_value(&self.get, &current.get)
            && same_value(&self.set, &current.set)
            && same_bit(self.writable, current.writable)
            && same_bit(self.enumerable, current.enumerable)
            && same_bit(self.configurable, current.configurable)
    }
}

// ---------------------------------------------------------------------------
// HeapObject
// ---------------------------------------------------------------------------

/// One object on the heap: identity is its position in the arena.
#[derive(Debug, Clone)]
pub struct HeapObject {
    pub kind: ObjectKind,
    pub prototype: Option<ObjectHandle>,
    extensible: bool,
    frozen: bool,
    properties: BTreeMap<String, PropertySlot>,
    elements: BTreeMap<String, SesValue>,
    numeric: Option<NumericPolicy>,
    side_tables: BTreeMap<TableId, SesValue>,
}

impl HeapObject {
    pub fn new(kind: ObjectKind, prototype: Option<ObjectHandle>) -> Self {
        Self {
            kind,
            prototype,
            extensible: true,
            frozen: false,
            properties: BTreeMap::new(),
            elements: BTreeMap::new(),
            numeric: None,
            side_tables: BTreeMap::new(),
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self.kind, ObjectKind::Record)
    }

    /// Records and arrays: the shapes the membrane converts generically.
    pub fn is_plain_aggregate(&self) -> bool {
        matches!(self.kind, ObjectKind::Record | ObjectKind::Array)
    }

    pub fn as_function(&self) -> Option<&FunctionObject> {
        match &self.kind {
            ObjectKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&PropertySlot> {
        self.properties.get(name)
    }

    pub fn element(&self, name: &str) -> Option<&SesValue> {
        self.elements.get(name)
    }

    pub fn numeric_policy(&self) -> Option<NumericPolicy> {
        self.numeric
    }

    /// No policy yet means numeric writes are unrestricted.
    pub fn numeric_writable(&self) -> bool {
        self.numeric.is_none_or(|n| n.writable)
    }

    pub fn numeric_configurable(&self) -> bool {
        self.numeric.is_none_or(|n| n.configurable)
    }

    // -- [[GetOwnProperty]] -------------------------------------------------

    pub fn get_own_property(&self, name: &str) -> Option<PropertyDescriptor> {
        if is_numeric_name(name) {
            return self.elements.get(name).map(|value| PropertyDescriptor {
                value: Some(value.clone()),
                writable: Some(self.numeric_writable()),
                enumerable: Some(true),
                configurable: Some(self.numeric_configurable()),
                ..PropertyDescriptor::default()
            });
        }
        self.properties.get(name).map(PropertyDescriptor::from_slot)
    }

    pub fn has_own_property(&self, name: &str) -> bool {
        if is_numeric_name(name) {
            self.elements.contains_key(name)
        } else {
            self.properties.contains_key(name)
        }
    }

    // -- [[DefineOwnProperty]] ----------------------------------------------

    /// Full descriptor write.  Every rejection is a typed error.
    ///
    /// Callers must have verified that `get`/`set` name function objects;
    /// see [`ObjectHeap::define_own_property`].
    pub fn define_own_property(
        &mut self,
        name: &str,
        desc: &PropertyDescriptor,
    ) -> Result<(), SesError> {
        if is_numeric_name(name) {
            return Err(SesError::NumericRedefinition {
                name: name.to_string(),
            });
        }
        check_property_name(name)?;
        desc.validate()?;

        let not_configurable = || SesError::NotConfigurable {
            name: name.to_string(),
        };

        let Some(current) = self.properties.get(name) else {
            if !self.extensible {
                return Err(SesError::NotExtensible {
                    name: name.to_string(),
                });
            }
            self.properties
                .insert(name.to_string(), PropertySlot::from_descriptor(desc));
            return Ok(());
        };

        if desc.is_empty() || desc.matches(&PropertyDescriptor::from_slot(current)) {
            return Ok(());
        }

        if !current.configurable {
            if desc.configurable == Some(true) {
                return Err(not_configurable());
            }
            if desc.enumerable.is_some_and(|e| e != current.enumerable) {
                return Err(not_configurable());
            }
        }

        let mut next = current.clone();
        if desc.is_generic_descriptor() {
            // Only enumerable/configurable change.
        } else if current.is_data() != desc.is_data_descriptor() {
            if !current.configurable {
                return Err(not_configurable());
            }
            // Kind change keeps enumerable/configurable, resets the rest.
            next.kind = if current.is_data() {
                SlotKind::Accessor {
                    get: None,
                    set: None,
                }
            } else {
                SlotKind::Data {
                    value: SesValue::Undefined,
                    writable: false,
                }
            };
        } else if let SlotKind::Data { value, writable } = &current.kind {
            if !current.configurable && !writable {
                if desc.writable == Some(true) {
                    return Err(not_configurable());
                }
                if desc.value.as_ref().is_some_and(|v| !v.same_value(value)) {
                    return Err(SesError::NotWritable {
                        name: name.to_string(),
                    });
                }
            }
        } else if !current.configurable {
            let changes = |want: &Option<SesValue>, have: Option<ObjectHandle>| {
                want.as_ref().is_some_and(|w| w.as_object() != have)
            };
            if changes(&desc.get, current.getter()) || changes(&desc.set, current.setter()) {
                return Err(not_configurable());
            }
        }

        next.apply(desc);
        self.properties.insert(name.to_string(), next);
        Ok(())
    }

    // -- [[Delete]] ---------------------------------------------------------

    /// Remove an own property.  Returns `false` when it is non-configurable;
    /// absent properties delete vacuously.
    pub fn delete(&mut self, name: &str) -> bool {
        if is_numeric_name(name) {
            if !self.elements.contains_key(name) {
                return true;
            }
            if !self.numeric_configurable() {
                return false;
            }
            self.elements.remove(name);
            return true;
        }
        match self.properties.get(name) {
            None => true,
            Some(slot) if !slot.configurable => false,
            Some(_) => {
                self.properties.remove(name);
                true
            }
        }
    }

    // -- Direct writes used by Put -------------------------------------------

    pub(crate) fn write_element(&mut self, name: &str, value: SesValue) {
        self.elements.insert(name.to_string(), value);
    }

    /// Write a writable data slot in place and record the fast-path marker.
    pub(crate) fn write_data(&mut self, name: &str, value: SesValue) -> bool {
        match self.properties.get_mut(name) {
            Some(PropertySlot {
                kind: SlotKind::Data {
                    value: slot_value,
                    writable: true,
                },
                fastpath_write,
                ..
            }) => {
                *slot_value = value;
                *fastpath_write = true;
                true
            }
            _ => false,
        }
    }

    // -- Object-level lifecycle ----------------------------------------------

    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    pub fn prevent_extensions(&mut self) {
        self.numeric.get_or_insert_with(NumericPolicy::default);
        self.extensible = false;
    }

    /// Non-extensible, every own property non-configurable.  Writability is
    /// left alone.
    pub fn seal(&mut self) {
        for slot in self.properties.values_mut() {
            slot.configurable = false;
        }
        self.numeric
            .get_or_insert_with(NumericPolicy::default)
            .configurable = false;
        self.extensible = false;
    }

    /// Seal plus every data slot and the numeric policy non-writable.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        for slot in self.properties.values_mut() {
            slot.configurable = false;
            slot.fastpath_write = false;
            if let SlotKind::Data { writable, .. } = &mut slot.kind {
                *writable = false;
            }
        }
        self.numeric = Some(NumericPolicy {
            writable: false,
            configurable: false,
        });
        self.extensible = false;
        self.frozen = true;
    }

    pub fn is_sealed(&self) -> bool {
        if self.frozen {
            return true;
        }
        !self.extensible
            && self.properties.values().all(|s| !s.configurable)
            && (self.elements.is_empty() || !self.numeric_configurable())
    }

    pub fn is_frozen(&self) -> bool {
        if self.frozen {
            return true;
        }
        !self.extensible
            && self
                .properties
                .values()
                .all(|s| !s.configurable && !s.is_writable())
            && (self.elements.is_empty()
                || (!self.numeric_configurable() && !self.numeric_writable()))
    }

    // -- Keys -------------------------------------------------------------------

    /// All own names: numeric names in numeric order, then named properties.
    pub fn own_keys(&self) -> Vec<String> {
        let mut numeric: Vec<(f64, &String)> = self
            .elements
            .keys()
            .map(|k| (k.parse::<f64>().unwrap_or(f64::NAN), k))
            .collect();
        numeric.sort_by(|a, b| a.0.total_cmp(&b.0));
        numeric
            .into_iter()
            .map(|(_, k)| k.clone())
            .chain(self.properties.keys().cloned())
            .collect()
    }

    /// Enumerable own names in [`Self::own_keys`] order.
    pub fn own_enumerable_keys(&self) -> Vec<String> {
        self.own_keys()
            .into_iter()
            .filter(|k| self.properties.get(k).is_none_or(|s| s.enumerable))
            .collect()
    }

    // -- Side tables (key-lifetime identity tables) ------------------------------

    pub(crate) fn side_table_get(&self, table: TableId) -> Option<&SesValue> {
        self.side_tables.get(&table)
    }

    pub(crate) fn side_table_set(&mut self, table: TableId, value: SesValue) {
        if value.is_undefined() {
            self.side_tables.remove(&table);
        } else {
            self.side_tables.insert(table, value);
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectHeap
// ---------------------------------------------------------------------------

/// Where a property lookup along the prototype chain landed.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupHit {
    Element(SesValue),
    Slot(PropertySlot),
}

/// Arena of heap objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectHeap {
    objects: Vec<HeapObject>,
    max_prototype_depth: u32,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_PROTOTYPE_DEPTH)
    }

    pub fn with_max_depth(max_prototype_depth: u32) -> Self {
        Self {
            objects: Vec::new(),
            max_prototype_depth,
        }
    }

    pub fn alloc(&mut self, kind: ObjectKind, prototype: Option<ObjectHandle>) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(HeapObject::new(kind, prototype));
        handle
    }

    /// Allocate an object that starts out frozen (tokens, guards, stamps).
    pub fn alloc_frozen(&mut self, kind: ObjectKind) -> ObjectHandle {
        let handle = self.alloc(kind, None);
        self.objects[handle.index()].freeze();
        handle
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<&HeapObject, SesError> {
        self.objects
            .get(handle.index())
            .ok_or(SesError::ObjectNotFound(handle))
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut HeapObject, SesError> {
        self.objects
            .get_mut(handle.index())
            .ok_or(SesError::ObjectNotFound(handle))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn max_prototype_depth(&self) -> u32 {
        self.max_prototype_depth
    }

    pub fn is_callable(&self, value: &SesValue) -> bool {
        value
            .as_object()
            .and_then(|h| self.get(h).ok())
            .is_some_and(|o| o.as_function().is_some())
    }

    pub fn is_record(&self, value: &SesValue) -> bool {
        value
            .as_object()
            .and_then(|h| self.get(h).ok())
            .is_some_and(HeapObject::is_record)
    }

    /// Prototype chain starting at `handle` (inclusive), with cycle and
    /// depth checking.
    pub fn chain(&self, handle: ObjectHandle) -> Result<Vec<ObjectHandle>, SesError> {
        let mut chain = Vec::new();
        let mut current = Some(handle);
        let mut depth: u32 = 0;
        while let Some(h) = current {
            if depth > self.max_prototype_depth {
                return Err(SesError::PrototypeChainTooDeep {
                    depth,
                    max: self.max_prototype_depth,
                });
            }
            if chain.contains(&h) {
                return Err(SesError::PrototypeCycleDetected);
            }
            chain.push(h);
            current = self.get(h)?.prototype;
            depth += 1;
        }
        Ok(chain)
    }

    /// Find `name` on `handle` or the nearest ancestor that has it.
    pub fn lookup(
        &self,
        handle: ObjectHandle,
        name: &str,
    ) -> Result<Option<(ObjectHandle, LookupHit)>, SesError> {
        let numeric = is_numeric_name(name);
        for h in self.chain(handle)? {
            let obj = self.get(h)?;
            if numeric {
                if let Some(v) = obj.element(name) {
                    return Ok(Some((h, LookupHit::Element(v.clone()))));
                }
            } else if let Some(slot) = obj.slot(name) {
                return Ok(Some((h, LookupHit::Slot(slot.clone()))));
            }
        }
        Ok(None)
    }

    /// `[[DefineOwnProperty]]` with accessor functions checked against the heap.
    pub fn define_own_property(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        desc: &PropertyDescriptor,
    ) -> Result<(), SesError> {
        for accessor in [&desc.get, &desc.set].into_iter().flatten() {
            if !accessor.is_undefined() && !self.is_callable(accessor) {
                return Err(SesError::InvalidDescriptor {
                    reason: format!("accessor {accessor} is not a function"),
                });
            }
        }
        self.get_mut(handle)?.define_own_property(name, desc)
    }

    /// Change `[[Prototype]]`, refusing cycles and non-extensible targets.
    pub fn set_prototype_of(
        &mut self,
        handle: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> Result<(), SesError> {
        if let Some(p) = proto
            && self.chain(p)?.contains(&handle)
        {
            return Err(SesError::PrototypeCycleDetected);
        }
        let obj = self.get_mut(handle)?;
        if obj.prototype == proto {
            return Ok(());
        }
        if !obj.is_extensible() {
            return Err(SesError::NotExtensible {
                name: "[[Prototype]]".to_string(),
            });
        }
        obj.prototype = proto;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
