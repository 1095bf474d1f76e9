//! Guards, trademarks and stamps.
//!
//! A guard coerces a specimen or ejects; it must be idempotent, so
//! re-coercing an accepted value returns that value again without failing.
//! A trademark pairs a guard with a stamp that marks records as carrying the
//! trademark; the guard accepts exactly the marked records.
//!
//! Every realm owns a `Guard` trademark.  Guard objects are registered with
//! it and [`coerce`]/[`passes_guard`] refuse anything it does not accept.
//! That check throws rather than ejects.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ejector::{Ejector, call_with_ejector, eject};
use crate::error::SesError;
use crate::identity_table::{IdentityTable, TableId, TableMode};
use crate::object_model::{ObjectHeap, ObjectKind};
use crate::realm::Realm;
use crate::value::{ObjectHandle, SesValue};

/// An immutable coerce-or-eject predicate.
pub trait Guard: fmt::Debug {
    fn name(&self) -> &str;

    /// Return the accepted value, or fail through `ejector` (or with
    /// [`SesError::GuardFailure`] when none is given).
    fn coerce(
        &self,
        realm: &mut Realm,
        specimen: &SesValue,
        ejector: Option<&Ejector>,
    ) -> Result<SesValue, SesError>;
}

type SharedTable = Rc<RefCell<IdentityTable>>;

// ---------------------------------------------------------------------------
// Trademark guard and stamp
// ---------------------------------------------------------------------------

/// Accepts exactly the objects its paired stamp has marked.
#[derive(Debug)]
pub struct TrademarkGuard {
    typename: String,
    table: SharedTable,
}

impl Guard for TrademarkGuard {
    fn name(&self) -> &str {
        &self.typename
    }

    fn coerce(
        &self,
        realm: &mut Realm,
        specimen: &SesValue,
        ejector: Option<&Ejector>,
    ) -> Result<SesValue, SesError> {
        if specimen.is_object() && self.table.borrow().contains(realm, specimen)? {
            return Ok(specimen.clone());
        }
        let message = format!(
            "Specimen does not have the \"{}\" trademark",
            self.typename
        );
        realm.emit(
            "guard",
            "coerce",
            "rejected",
            None,
            format!("{}T: {specimen}", self.typename),
        );
        eject(ejector, SesValue::from(message))
    }
}

/// Marking capability paired with a [`TrademarkGuard`].
#[derive(Debug)]
pub struct StampCapability {
    typename: String,
    table: SharedTable,
}

impl StampCapability {
    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// Record `record` as carrying this trademark.  The record must be a
    /// genuine, unfrozen record; it is returned still unfrozen.
    pub fn mark(&self, realm: &mut Realm, record: &SesValue) -> Result<SesValue, SesError> {
        let handle = unfrozen_record(realm, record)?;
        self.table
            .borrow_mut()
            .set(realm, record, SesValue::Bool(true))?;
        realm.emit(
            "guard",
            "mark",
            "stamped",
            None,
            format!("{}Stamp: {handle}", self.typename),
        );
        Ok(record.clone())
    }
}

fn unfrozen_record(realm: &Realm, record: &SesValue) -> Result<ObjectHandle, SesError> {
    let handle = record
        .as_object()
        .filter(|h| realm.heap.get(*h).is_ok_and(|o| o.is_record()))
        .ok_or_else(|| SesError::NotARecord(record.clone()))?;
    if realm.heap.get(handle)?.is_frozen() {
        return Err(SesError::FrozenRecord(handle));
    }
    Ok(handle)
}

/// The `{guard, stamp}` pair produced by [`make_trademark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trademark {
    pub guard: ObjectHandle,
    pub stamp: ObjectHandle,
}

impl Trademark {
    pub fn guard_value(&self) -> SesValue {
        SesValue::Object(self.guard)
    }

    pub fn stamp_value(&self) -> SesValue {
        SesValue::Object(self.stamp)
    }
}

fn alloc_trademark(heap: &mut ObjectHeap, typename: &str, table: IdentityTable) -> Trademark {
    let table = Rc::new(RefCell::new(table));
    let guard = heap.alloc_frozen(ObjectKind::Guard(Rc::new(TrademarkGuard {
        typename: typename.to_string(),
        table: Rc::clone(&table),
    })));
    let stamp = heap.alloc_frozen(ObjectKind::Stamp(Rc::new(StampCapability {
        typename: typename.to_string(),
        table,
    })));
    Trademark { guard, stamp }
}

/// Build the realm's own `Guard` trademark.  Its guard is registered with
/// itself.
pub(crate) fn bootstrap_guard_trademark(heap: &mut ObjectHeap, table: TableId) -> Trademark {
    let mark = alloc_trademark(heap, "Guard", IdentityTable::new(table, TableMode::KeyLifetime));
    if let Ok(obj) = heap.get_mut(mark.guard) {
        obj.side_table_set(table, SesValue::Bool(true));
    }
    mark
}

/// Register a guard object with the realm's `Guard` trademark.
fn register_guard(realm: &mut Realm, guard: ObjectHandle) -> Result<(), SesError> {
    let guard_table = stamp_table(realm, realm.guard_trademark().stamp)?;
    guard_table
        .borrow_mut()
        .set(realm, &SesValue::Object(guard), SesValue::Bool(true))
}

fn stamp_table(realm: &Realm, stamp: ObjectHandle) -> Result<SharedTable, SesError> {
    match &realm.heap.get(stamp)?.kind {
        ObjectKind::Stamp(s) => Ok(Rc::clone(&s.table)),
        _ => Err(SesError::NotAStamp(SesValue::Object(stamp))),
    }
}

// ---------------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------------

/// New trademark named `typename`, its guard registered as a guard.
pub fn make_trademark(realm: &mut Realm, typename: &str) -> Result<Trademark, SesError> {
    let table = realm.new_identity_table(TableMode::KeyLifetime);
    let mark = alloc_trademark(&mut realm.heap, typename, table);
    register_guard(realm, mark.guard)?;
    Ok(mark)
}

/// Wrap a custom guard in a frozen, registered guard object.
pub fn new_guard(realm: &mut Realm, guard: Rc<dyn Guard>) -> Result<SesValue, SesError> {
    let handle = realm.heap.alloc_frozen(ObjectKind::Guard(guard));
    register_guard(realm, handle)?;
    Ok(SesValue::Object(handle))
}

/// Verify `value` is a registered guard and return its behaviour.
fn require_guard(realm: &mut Realm, value: &SesValue) -> Result<Rc<dyn Guard>, SesError> {
    let guard_t = resolve_guard_object(realm, &realm.guard_trademark().guard_value())?;
    guard_t
        .coerce(realm, value, None)
        .map_err(|_| SesError::NotAGuard(value.clone()))?;
    resolve_guard_object(realm, value)
}

fn resolve_guard_object(realm: &Realm, value: &SesValue) -> Result<Rc<dyn Guard>, SesError> {
    let not_a_guard = || SesError::NotAGuard(value.clone());
    let handle = value.as_object().ok_or_else(not_a_guard)?;
    match &realm.heap.get(handle).map_err(|_| not_a_guard())?.kind {
        ObjectKind::Guard(g) => Ok(Rc::clone(g)),
        _ => Err(not_a_guard()),
    }
}

/// First ensure `guard` is a guard (failure throws), then coerce `specimen`.
pub fn coerce(
    realm: &mut Realm,
    guard: &SesValue,
    specimen: &SesValue,
    ejector: Option<&Ejector>,
) -> Result<SesValue, SesError> {
    let g = require_guard(realm, guard)?;
    g.coerce(realm, specimen, ejector)
}

/// Does `specimen` pass `guard`?  A non-guard `guard` throws.
pub fn passes_guard(
    realm: &mut Realm,
    guard: &SesValue,
    specimen: &SesValue,
) -> Result<bool, SesError> {
    let g = require_guard(realm, guard)?;
    call_with_ejector(
        realm,
        |realm, ej| {
            g.coerce(realm, specimen, Some(ej))?;
            Ok(true)
        },
        |_, _| Ok(false),
    )
}

/// Mark `record` with every stamp, then freeze it.
///
/// All preconditions are checked before the first mark is applied: `record`
/// must be an unfrozen record and every element of `stamps` a genuine stamp.
pub fn stamp(
    realm: &mut Realm,
    stamps: &[SesValue],
    record: &SesValue,
) -> Result<SesValue, SesError> {
    unfrozen_record(realm, record)?;
    let mut capabilities = Vec::with_capacity(stamps.len());
    for s in stamps {
        let capability = s
            .as_object()
            .and_then(|h| realm.heap.get(h).ok())
            .and_then(|o| match &o.kind {
                ObjectKind::Stamp(cap) => Some(Rc::clone(cap)),
                _ => None,
            })
            .ok_or_else(|| SesError::NotAStamp(s.clone()))?;
        capabilities.push(capability);
    }
    for capability in capabilities {
        capability.mark(realm, record)?;
    }
    realm.freeze(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Coerces numeric strings to numbers; numbers pass unchanged.
    #[derive(Debug)]
    struct NumberGuard;

    impl Guard for NumberGuard {
        fn name(&self) -> &str {
            "Number"
        }

        fn coerce(
            &self,
            _realm: &mut Realm,
            specimen: &SesValue,
            ejector: Option<&Ejector>,
        ) -> Result<SesValue, SesError> {
            match specimen {
                SesValue::Number(_) => Ok(specimen.clone()),
                SesValue::Str(s) => match s.parse::<f64>() {
                    Ok(n) => Ok(SesValue::Number(n)),
                    Err(_) => eject(ejector, SesValue::from("not numeric")),
                },
                _ => eject(ejector, SesValue::from("not numeric")),
            }
        }
    }

    #[test]
    fn trademark_guard_accepts_only_marked() {
        let mut realm = Realm::new();
        let mark = make_trademark(&mut realm, "Widget").unwrap();
        let marked = realm.new_record();
        let other = realm.new_record();
        let stamp_obj = realm.heap.get(mark.stamp).unwrap();
        let cap = match &stamp_obj.kind {
            ObjectKind::Stamp(c) => Rc::clone(c),
            _ => unreachable!(),
        };
        cap.mark(&mut realm, &marked).unwrap();
        assert!(!realm.is_frozen(&marked).unwrap());
        assert!(passes_guard(&mut realm, &mark.guard_value(), &marked).unwrap());
        assert!(!passes_guard(&mut realm, &mark.guard_value(), &other).unwrap());
        assert!(!passes_guard(&mut realm, &mark.guard_value(), &SesValue::from(1)).unwrap());
    }

    #[test]
    fn coerce_without_ejector_throws_guard_failure() {
        let mut realm = Realm::new();
        let mark = make_trademark(&mut realm, "Widget").unwrap();
        let other = realm.new_record();
        let err = coerce(&mut realm, &mark.guard_value(), &other, None).unwrap_err();
        assert_eq!(
            err,
            SesError::GuardFailure(SesValue::from(
                "Specimen does not have the \"Widget\" trademark"
            ))
        );
    }

    #[test]
    fn non_guard_is_rejected_by_throwing() {
        let mut realm = Realm::new();
        let fake = realm.new_record();
        assert_eq!(
            passes_guard(&mut realm, &fake, &SesValue::from(1)),
            Err(SesError::NotAGuard(fake.clone()))
        );
        assert!(matches!(
            coerce(&mut realm, &SesValue::from(1), &fake, None),
            Err(SesError::NotAGuard(_))
        ));
    }

    #[test]
    fn guard_trademark_accepts_itself_and_new_guards() {
        let mut realm = Realm::new();
        let guard_t = realm.guard_trademark().guard_value();
        assert!(passes_guard(&mut realm, &guard_t, &guard_t).unwrap());
        let mark = make_trademark(&mut realm, "Thing").unwrap();
        assert!(passes_guard(&mut realm, &guard_t, &mark.guard_value()).unwrap());
        assert!(!passes_guard(&mut realm, &guard_t, &mark.stamp_value()).unwrap());
    }

    #[test]
    fn custom_guard_is_idempotent() {
        let mut realm = Realm::new();
        let g = new_guard(&mut realm, Rc::new(NumberGuard)).unwrap();
        let once = coerce(&mut realm, &g, &SesValue::from("4.5"), None).unwrap();
        assert_eq!(once, SesValue::Number(4.5));
        let twice = coerce(&mut realm, &g, &once, None).unwrap();
        assert_eq!(twice, once);
        assert!(!passes_guard(&mut realm, &g, &SesValue::Null).unwrap());
    }

    #[test]
    fn unregistered_guard_object_is_not_a_guard() {
        let mut realm = Realm::new();
        let rogue = realm
            .heap
            .alloc_frozen(ObjectKind::Guard(Rc::new(NumberGuard)));
        assert!(matches!(
            coerce(&mut realm, &SesValue::Object(rogue), &SesValue::from(1), None),
            Err(SesError::NotAGuard(_))
        ));
    }

    #[test]
    fn stamp_checks_everything_before_marking() {
        let mut realm = Realm::new();
        let a = make_trademark(&mut realm, "A").unwrap();
        let r = realm.new_record();
        let bogus = realm.new_record();
        let err = stamp(&mut realm, &[a.stamp_value(), bogus.clone()], &r).unwrap_err();
        assert_eq!(err, SesError::NotAStamp(bogus));
        assert!(!passes_guard(&mut realm, &a.guard_value(), &r).unwrap());
        assert!(!realm.is_frozen(&r).unwrap());
    }

    #[test]
    fn stamp_rejects_frozen_and_non_records() {
        let mut realm = Realm::new();
        let a = make_trademark(&mut realm, "A").unwrap();
        let frozen = realm.new_record();
        realm.freeze(&frozen).unwrap();
        assert!(matches!(
            stamp(&mut realm, &[a.stamp_value()], &frozen),
            Err(SesError::FrozenRecord(_))
        ));
        let arr = realm.new_array(vec![]).unwrap();
        assert!(matches!(
            stamp(&mut realm, &[a.stamp_value()], &arr),
            Err(SesError::NotARecord(_))
        ));
        assert!(matches!(
            stamp(&mut realm, &[a.stamp_value()], &SesValue::from(1)),
            Err(SesError::NotARecord(_))
        ));
    }

    #[test]
    fn stamp_with_several_trademarks() {
        let mut realm = Realm::new();
        let a = make_trademark(&mut realm, "A").unwrap();
        let b = make_trademark(&mut realm, "B").unwrap();
        let r = realm.new_record();
        let out = stamp(&mut realm, &[a.stamp_value(), b.stamp_value()], &r).unwrap();
        assert_eq!(out, r);
        assert!(realm.is_frozen(&r).unwrap());
        assert!(passes_guard(&mut realm, &a.guard_value(), &r).unwrap());
        assert!(passes_guard(&mut realm, &b.guard_value(), &r).unwrap());
    }

    #[test]
    fn rejection_and_marking_emit_events() {
        let mut realm = Realm::new();
        let a = make_trademark(&mut realm, "A").unwrap();
        let r = realm.new_record();
        stamp(&mut realm, &[a.stamp_value()], &r).unwrap();
        let other = realm.new_record();
        passes_guard(&mut realm, &a.guard_value(), &other).unwrap();
        let events: Vec<String> = realm
            .drain_events()
            .into_iter()
            .map(|e| format!("{}:{}", e.event, e.outcome))
            .collect();
        assert!(events.contains(&"mark:stamped".to_string()));
        assert!(events.contains(&"coerce:rejected".to_string()));
        assert!(events.contains(&"ejection:caught".to_string()));
    }
}
