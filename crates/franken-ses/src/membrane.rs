//! The taming membrane.
//!
//! `tame` maps a host-side ("feral") value to its guest-side ("tame")
//! representation and `untame` maps back.  Registered pairs form a bijection
//! held in two maps that only [`Realm::register_twins`] and the provisional
//! link may write, so `tame(f) == t` iff `untame(t) == f`.
//!
//! Resolution order for an object, in either direction:
//!
//! 1. a registered twin;
//! 2. the object already lives on the target side (diagnostic, returned as is);
//! 3. a [`TwinConversion`] registered on the object or an ancestor;
//! 4. functions convert to themselves;
//! 5. records and arrays convert generically, cycle-safe;
//! 6. otherwise no result.
//!
//! A conversion failure is `Ok(None)`, never an error.  Errors are reserved
//! for invariant violations such as conflicting registrations, and for object
//! graphs nested deeper than [`crate::realm::RealmConfig::max_conversion_depth`].
//!
//! A conversion is all or nothing: when it fails with an error, every pair it
//! registered on the way down is unregistered again, so no half-built shadow
//! stays reachable from either side.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::error::SesError;
use crate::object_model::{ObjectKind, PropertyDescriptor};
use crate::realm::Realm;
use crate::value::{ObjectHandle, SesValue, is_numeric_name};

/// Default nesting limit for recursive conversion.  Matches serde_json's
/// recursion limit, so anything `json_bridge::parse` builds converts.
pub const DEFAULT_MAX_CONVERSION_DEPTH: u32 = 128;

/// Custom conversion attached to an object (and inherited by objects whose
/// prototype chain reaches it).
///
/// Implementations are only invoked on objects that are not yet registered on
/// either side.  They return a fresh unregistered object (possibly the same
/// one) or `None` for failure; the membrane registers the pair.
pub trait TwinConversion {
    fn as_tamed(
        &self,
        realm: &mut Realm,
        feral: ObjectHandle,
    ) -> Result<Option<ObjectHandle>, SesError> {
        let _ = (realm, feral);
        Ok(None)
    }

    fn as_feral(
        &self,
        realm: &mut Realm,
        tame: ObjectHandle,
    ) -> Result<Option<ObjectHandle>, SesError> {
        let _ = (realm, tame);
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Tame,
    Untame,
}

impl Direction {
    fn reverse(self) -> Self {
        match self {
            Self::Tame => Self::Untame,
            Self::Untame => Self::Tame,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Self::Tame => "tame",
            Self::Untame => "untame",
        }
    }

    /// `(feral, tame)` for a conversion from `source` to `target`.
    fn pair(self, source: ObjectHandle, target: ObjectHandle) -> (ObjectHandle, ObjectHandle) {
        match self {
            Self::Tame => (source, target),
            Self::Untame => (target, source),
        }
    }
}

// ---------------------------------------------------------------------------
// Membrane state
// ---------------------------------------------------------------------------

/// Bijection maps plus the conversion registry.
#[derive(Default)]
pub struct Membrane {
    tame_of: HashMap<ObjectHandle, ObjectHandle>,
    feral_of: HashMap<ObjectHandle, ObjectHandle>,
    conversions: HashMap<ObjectHandle, Rc<dyn TwinConversion>>,
    /// Pairs registered while a conversion is in progress, oldest first.
    journal: Vec<(ObjectHandle, ObjectHandle)>,
    /// Nesting of in-progress conversions.
    depth: u32,
}

impl Membrane {
    /// Registered tame twin of `feral`, back-pointer checked.
    fn tame_twin(&self, feral: ObjectHandle) -> Option<ObjectHandle> {
        self.tame_of
            .get(&feral)
            .copied()
            .filter(|t| self.feral_of.get(t) == Some(&feral))
    }

    /// Registered feral twin of `tame`, back-pointer checked.
    fn feral_twin(&self, tame: ObjectHandle) -> Option<ObjectHandle> {
        self.feral_of
            .get(&tame)
            .copied()
            .filter(|f| self.tame_of.get(f) == Some(&tame))
    }

    fn twin(&self, direction: Direction, source: ObjectHandle) -> Option<ObjectHandle> {
        match direction {
            Direction::Tame => self.tame_twin(source),
            Direction::Untame => self.feral_twin(source),
        }
    }

    fn link(&mut self, feral: ObjectHandle, tame: ObjectHandle) {
        self.tame_of.insert(feral, tame);
        self.feral_of.insert(tame, feral);
    }

    fn unlink(&mut self, feral: ObjectHandle, tame: ObjectHandle) {
        if self.tame_of.get(&feral) == Some(&tame) {
            self.tame_of.remove(&feral);
        }
        if self.feral_of.get(&tame) == Some(&feral) {
            self.feral_of.remove(&tame);
        }
    }

    /// Unregister every pair journaled after `mark`.  Returns how many.
    fn roll_back(&mut self, mark: usize) -> usize {
        if mark >= self.journal.len() {
            return 0;
        }
        let undone = self.journal.split_off(mark);
        for &(feral, tame) in undone.iter().rev() {
            self.unlink(feral, tame);
        }
        undone.len()
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.tame_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tame_of.is_empty()
    }
}

/// Provisional registration for an in-progress aggregate conversion.
///
/// Dereferences to the realm so recursion can continue through it; the link
/// is removed when the guard drops, whatever the exit path.
struct ProvisionalTwin<'r> {
    realm: &'r mut Realm,
    feral: ObjectHandle,
    tame: ObjectHandle,
}

impl<'r> ProvisionalTwin<'r> {
    fn link(realm: &'r mut Realm, feral: ObjectHandle, tame: ObjectHandle) -> Self {
        realm.membrane.link(feral, tame);
        Self { realm, feral, tame }
    }
}

impl Deref for ProvisionalTwin<'_> {
    type Target = Realm;

    fn deref(&self) -> &Realm {
        self.realm
    }
}

impl DerefMut for ProvisionalTwin<'_> {
    fn deref_mut(&mut self) -> &mut Realm {
        self.realm
    }
}

impl Drop for ProvisionalTwin<'_> {
    fn drop(&mut self) {
        self.realm.membrane.unlink(self.feral, self.tame);
    }
}

/// Installed by [`Realm::protect_global`].
struct ProtectedGlobal;

impl TwinConversion for ProtectedGlobal {
    fn as_tamed(
        &self,
        _realm: &mut Realm,
        _feral: ObjectHandle,
    ) -> Result<Option<ObjectHandle>, SesError> {
        Err(SesError::GlobalAlmostLeaked)
    }

    fn as_feral(
        &self,
        _realm: &mut Realm,
        _tame: ObjectHandle,
    ) -> Result<Option<ObjectHandle>, SesError> {
        Err(SesError::GlobalLeak)
    }
}

// ---------------------------------------------------------------------------
// Realm entry points
// ---------------------------------------------------------------------------

impl Realm {
    pub fn membrane(&self) -> &Membrane {
        &self.membrane
    }

    /// Record that `feral` tames to `tame` and `tame` untames to `feral`.
    ///
    /// Re-registering the identical pair is a logged no-op.  Any other
    /// registration touching an already-registered identity is an error and
    /// leaves the existing pairs untouched.
    pub fn register_twins(&mut self, feral: &SesValue, tame: &SesValue) -> Result<(), SesError> {
        let f = feral.as_object().ok_or_else(|| SesError::UnexpectedPrimitive {
            side: "feral",
            value: feral.clone(),
        })?;
        let t = tame.as_object().ok_or_else(|| SesError::UnexpectedPrimitive {
            side: "tame",
            value: tame.clone(),
        })?;

        if self.membrane.tame_twin(f) == Some(t) {
            let message = format!("multiply tamed: {f}, {t}");
            self.log(&message);
            self.emit("membrane", "register_twins", "duplicate", None, message);
            return Ok(());
        }

        let conflict = if self.membrane.tame_twin(f).is_some() {
            Some(SesError::AlreadyTamesTo(f))
        } else if self.membrane.feral_twin(t).is_some() {
            Some(SesError::AlreadyUntamesTo(t))
        } else if self.membrane.feral_twin(f).is_some() {
            Some(SesError::AlreadyTame(f))
        } else if self.membrane.tame_twin(t).is_some() {
            Some(SesError::AlreadyFeral(t))
        } else {
            None
        };
        if let Some(err) = conflict {
            self.emit(
                "membrane",
                "register_twins",
                "conflict",
                Some(err.stable_code()),
                err.to_string(),
            );
            return Err(err);
        }

        self.membrane.link(f, t);
        if self.membrane.depth > 0 {
            self.membrane.journal.push((f, t));
        }
        self.emit(
            "membrane",
            "register_twins",
            "registered",
            None,
            format!("{f} <-> {t}"),
        );
        Ok(())
    }

    /// Mark `value` as both its own tame and feral twin.
    pub fn register_self_twin(&mut self, value: &SesValue) -> Result<(), SesError> {
        if value.is_primitive() {
            return Err(SesError::UnexpectedPrimitive {
                side: "self",
                value: value.clone(),
            });
        }
        self.register_twins(value, value)
    }

    /// Attach a custom conversion to `obj`.  Replaces any earlier one.
    pub fn set_conversion(
        &mut self,
        obj: &SesValue,
        conversion: Rc<dyn TwinConversion>,
    ) -> Result<(), SesError> {
        let handle = obj.as_object().ok_or(SesError::NotAnObject {
            operation: "set_conversion",
            type_name: obj.type_name(),
        })?;
        self.heap.get(handle)?;
        self.membrane.conversions.insert(handle, conversion);
        Ok(())
    }

    /// Make `global` unconvertible: taming it fails with a catchable error,
    /// untaming it with an uncatchable one.
    pub fn protect_global(&mut self, global: &SesValue) -> Result<(), SesError> {
        self.set_conversion(global, Rc::new(ProtectedGlobal))
    }

    /// Guest-side representation of `feral`, or `None` when it cannot cross.
    pub fn tame(&mut self, feral: &SesValue) -> Result<Option<SesValue>, SesError> {
        self.convert(feral, Direction::Tame)
    }

    /// Host-side representation of `tame`, or `None` when it cannot cross.
    pub fn untame(&mut self, tame: &SesValue) -> Result<Option<SesValue>, SesError> {
        self.convert(tame, Direction::Untame)
    }

    /// [`Self::tame`], with failure reported as the realm's `NO_RESULT` token.
    pub fn tame_or_no_result(&mut self, feral: &SesValue) -> Result<SesValue, SesError> {
        Ok(self.tame(feral)?.unwrap_or_else(|| self.no_result()))
    }

    /// Tame a whole argument list; one failure fails the list.
    pub fn tame_all(&mut self, ferals: &[SesValue]) -> Result<Option<Vec<SesValue>>, SesError> {
        let mut out = Vec::with_capacity(ferals.len());
        for f in ferals {
            match self.tame(f)? {
                Some(t) => out.push(t),
                None => return Ok(None),
            }
        }
        Ok(Some(out))
    }

    /// Registered tame twin, without converting.
    pub fn tame_twin_of(&self, feral: &SesValue) -> Option<SesValue> {
        self.membrane
            .tame_twin(feral.as_object()?)
            .map(SesValue::Object)
    }

    /// Registered feral twin, without converting.
    pub fn feral_twin_of(&self, tame: &SesValue) -> Option<SesValue> {
        self.membrane
            .feral_twin(tame.as_object()?)
            .map(SesValue::Object)
    }

    /// One conversion step, with the nesting limit and error rollback.
    fn convert(
        &mut self,
        value: &SesValue,
        direction: Direction,
    ) -> Result<Option<SesValue>, SesError> {
        let Some(source) = value.as_object() else {
            return Ok(Some(value.clone()));
        };
        let max = self.config().max_conversion_depth;
        if self.membrane.depth >= max {
            let err = SesError::ConversionTooDeep { max };
            self.emit(
                "membrane",
                direction.operation(),
                "too_deep",
                Some(err.stable_code()),
                source.to_string(),
            );
            return Err(err);
        }

        let mark = self.membrane.journal.len();
        self.membrane.depth += 1;
        let result = self.convert_object(source, direction);
        self.membrane.depth -= 1;
        match &result {
            Err(err) => {
                let undone = self.membrane.roll_back(mark);
                if undone > 0 {
                    let detail = format!("{undone} pair(s) unregistered after {err}");
                    self.emit(
                        "membrane",
                        direction.operation(),
                        "rolled_back",
                        Some(err.stable_code()),
                        detail,
                    );
                }
            }
            Ok(_) if self.membrane.depth == 0 => self.membrane.journal.clear(),
            Ok(_) => {}
        }
        result
    }

    fn convert_object(
        &mut self,
        source: ObjectHandle,
        direction: Direction,
    ) -> Result<Option<SesValue>, SesError> {
        let value = SesValue::Object(source);
        if let Some(twin) = self.membrane.twin(direction, source) {
            return Ok(Some(SesValue::Object(twin)));
        }
        if self.membrane.twin(direction.reverse(), source).is_some() {
            let message = match direction {
                Direction::Tame => format!("Tame-only object from feral side: {source}"),
                Direction::Untame => format!("Feral-only object from tame side: {source}"),
            };
            self.log(&message);
            self.emit("membrane", direction.operation(), "cross_side", None, message);
            return Ok(Some(value));
        }

        if let Some(conversion) = self.conversion_for(source)? {
            let converted = match direction {
                Direction::Tame => conversion.as_tamed(self, source)?,
                Direction::Untame => conversion.as_feral(self, source)?,
            };
            return self.finish(direction, source, converted);
        }

        let obj = self.heap.get(source)?;
        let converted = if obj.as_function().is_some() {
            Some(source)
        } else if obj.is_plain_aggregate() {
            Some(self.convert_aggregate(source, direction)?)
        } else {
            None
        };
        self.finish(direction, source, converted)
    }

    fn finish(
        &mut self,
        direction: Direction,
        source: ObjectHandle,
        converted: Option<ObjectHandle>,
    ) -> Result<Option<SesValue>, SesError> {
        let Some(target) = converted else {
            self.emit(
                "membrane",
                direction.operation(),
                "no_result",
                None,
                source.to_string(),
            );
            return Ok(None);
        };
        let (feral, tame) = direction.pair(source, target);
        self.register_twins(&SesValue::Object(feral), &SesValue::Object(tame))?;
        Ok(Some(SesValue::Object(target)))
    }

    fn conversion_for(
        &self,
        handle: ObjectHandle,
    ) -> Result<Option<Rc<dyn TwinConversion>>, SesError> {
        for h in self.heap.chain(handle)? {
            if let Some(conversion) = self.membrane.conversions.get(&h) {
                return Ok(Some(Rc::clone(conversion)));
            }
        }
        Ok(None)
    }

    /// Convert a record or array property by property.
    ///
    /// Returns `source` itself when it was already frozen and every property
    /// converted to itself; otherwise a frozen shadow holding the converted
    /// properties.  Accessor properties and values that fail to convert are
    /// omitted.
    fn convert_aggregate(
        &mut self,
        source: ObjectHandle,
        direction: Direction,
    ) -> Result<ObjectHandle, SesError> {
        let src = self.heap.get(source)?;
        let kind = if src.is_record() {
            ObjectKind::Record
        } else {
            ObjectKind::Array
        };
        let mut changed = !src.is_frozen();
        let keys = src.own_enumerable_keys();
        let shadow = self.heap.alloc(kind, None);

        let (feral, tame) = direction.pair(source, shadow);
        let mut realm = ProvisionalTwin::link(self, feral, tame);
        for key in keys {
            let value = realm
                .heap
                .get(source)?
                .get_own_property(&key)
                .and_then(|desc| desc.value);
            let Some(value) = value else {
                changed = true;
                continue;
            };
            let Some(converted) = realm.convert(&value, direction)? else {
                changed = true;
                continue;
            };
            if !converted.same_value(&value) {
                changed = true;
            }
            let target = realm.heap.get_mut(shadow)?;
            if is_numeric_name(&key) {
                target.write_element(&key, converted);
            } else {
                target.define_own_property(&key, &PropertyDescriptor::data(converted))?;
            }
        }
        drop(realm);

        if !changed {
            return Ok(source);
        }
        self.heap.get_mut(shadow)?.freeze();
        Ok(shadow)
    }
}
