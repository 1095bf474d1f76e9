//! Integration tests for the object protocol and the attribute store.
//!
//! Focus areas:
//! - Define/Put/Get workflows across object lifecycle transitions
//! - Descriptor no-op detection under SameValue
//! - Numeric-slot policy versus named slots
//! - Reserved-name rejection on every entry point
//! - Serde shape of descriptors and values

use frankenengine_ses::object_model::{NumericPolicy, SlotKind};
use frankenengine_ses::{PropertyDescriptor, Realm, SesError, SesValue, Strictness};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn int_val(n: i32) -> SesValue {
    SesValue::from(n)
}

fn full_access(value: SesValue) -> PropertyDescriptor {
    PropertyDescriptor::data(value)
}

fn snapshot(realm: &Realm, obj: &SesValue) -> Vec<(String, Option<PropertyDescriptor>)> {
    realm
        .own_keys(obj)
        .unwrap()
        .into_iter()
        .map(|k| {
            let d = realm.get_own_property_descriptor(obj, &k).unwrap();
            (k, d)
        })
        .collect()
}

// ===========================================================================
// 1. End-to-end
// ===========================================================================

#[test]
fn define_put_freeze_put_scenario() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    assert!(realm.is_extensible(&o).unwrap());
    assert!(realm.own_keys(&o).unwrap().is_empty());

    realm
        .define_own_property(&o, "x", &full_access(int_val(1)))
        .unwrap();
    realm.put(&o, "x", int_val(2)).unwrap();
    assert_eq!(realm.get(&o, "x").unwrap(), int_val(2));

    realm.freeze(&o).unwrap();
    assert!(matches!(
        realm.put(&o, "x", int_val(3)),
        Err(SesError::NotWritable { .. })
    ));
    assert_eq!(realm.get(&o, "x").unwrap(), int_val(2));
}

#[test]
fn absent_property_reads_as_undefined() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    assert_eq!(realm.get(&o, "missing").unwrap(), SesValue::Undefined);
    assert_eq!(realm.get(&o, "7").unwrap(), SesValue::Undefined);
    assert!(!realm.has_property(&o, "missing").unwrap());
    assert_eq!(realm.get_own_property_descriptor(&o, "missing").unwrap(), None);
}

// ===========================================================================
// 2. Lifecycle idempotence
// ===========================================================================

#[test]
fn prevent_extensions_twice_is_once() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    realm.put(&o, "a", int_val(1)).unwrap();
    realm.prevent_extensions(&o).unwrap();
    let once = snapshot(&realm, &o);
    realm.prevent_extensions(&o).unwrap();
    assert_eq!(snapshot(&realm, &o), once);
    assert!(!realm.is_extensible(&o).unwrap());
}

#[test]
fn seal_twice_is_once() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    realm.put(&o, "a", int_val(1)).unwrap();
    realm.seal(&o).unwrap();
    let once = snapshot(&realm, &o);
    realm.seal(&o).unwrap();
    assert_eq!(snapshot(&realm, &o), once);
    assert!(realm.is_sealed(&o).unwrap());
}

#[test]
fn freeze_twice_is_once() {
    let mut realm = Realm::new();
    let o = realm.new_array(vec![int_val(1), int_val(2)]).unwrap();
    realm.freeze(&o).unwrap();
    let once = snapshot(&realm, &o);
    realm.freeze(&o).unwrap();
    assert_eq!(snapshot(&realm, &o), once);
    assert!(realm.is_frozen(&o).unwrap());
    assert!(realm.is_sealed(&o).unwrap());
}

#[test]
fn lockdown_is_one_directional() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    realm.put(&o, "a", int_val(1)).unwrap();
    realm.freeze(&o).unwrap();
    for desc in [
        PropertyDescriptor::default().with_writable(true),
        PropertyDescriptor::default().with_configurable(true),
        PropertyDescriptor::default().with_enumerable(false),
    ] {
        assert!(realm.define_own_property(&o, "a", &desc).is_err());
    }
    assert!(
        realm
            .delete_property(&o, "a", Strictness::Strict)
            .is_err()
    );
    assert!(realm.is_frozen(&o).unwrap());
}

#[test]
fn sealed_object_still_accepts_writes() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    realm.put(&o, "a", int_val(1)).unwrap();
    realm.seal(&o).unwrap();
    realm.put(&o, "a", int_val(2)).unwrap();
    assert_eq!(realm.get(&o, "a").unwrap(), int_val(2));
    assert!(!realm.delete_property(&o, "a", Strictness::Sloppy).unwrap());
}

// ===========================================================================
// 3. Descriptor no-op detection
// ===========================================================================

#[test]
fn locked_property_accepts_exact_restatement() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    let locked = PropertyDescriptor::data_frozen(int_val(7)).with_enumerable(true);
    realm.define_own_property(&o, "k", &locked).unwrap();

    realm.define_own_property(&o, "k", &locked).unwrap();
    realm
        .define_own_property(&o, "k", &PropertyDescriptor::default())
        .unwrap();
    realm
        .define_own_property(&o, "k", &PropertyDescriptor::default().with_value(int_val(7)))
        .unwrap();
    assert!(matches!(
        realm.define_own_property(&o, "k", &PropertyDescriptor::default().with_value(int_val(8))),
        Err(SesError::NotWritable { .. })
    ));
    assert_eq!(
        realm.get_own_property_descriptor(&o, "k").unwrap(),
        Some(locked)
    );
}

#[test]
fn locked_nan_restatement_is_a_no_op() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    let nan = PropertyDescriptor::data_frozen(SesValue::Number(f64::NAN));
    realm.define_own_property(&o, "n", &nan).unwrap();
    realm.define_own_property(&o, "n", &nan).unwrap();
}

#[test]
fn locked_signed_zero_change_is_rejected() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    realm
        .define_own_property(&o, "z", &PropertyDescriptor::data_frozen(SesValue::Number(0.0)))
        .unwrap();
    assert!(matches!(
        realm.define_own_property(
            &o,
            "z",
            &PropertyDescriptor::default().with_value(SesValue::Number(-0.0))
        ),
        Err(SesError::NotWritable { .. })
    ));
}

#[test]
fn merge_keeps_current_attributes() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    realm
        .define_own_property(&o, "a", &full_access(int_val(1)))
        .unwrap();
    realm
        .define_own_property(&o, "a", &PropertyDescriptor::default().with_enumerable(false))
        .unwrap();
    let desc = realm.get_own_property_descriptor(&o, "a").unwrap().unwrap();
    assert_eq!(desc.value, Some(int_val(1)));
    assert_eq!(desc.writable, Some(true));
    assert_eq!(desc.enumerable, Some(false));
    assert_eq!(desc.configurable, Some(true));
    assert!(realm.keys(&o).unwrap().is_empty());
}

#[test]
fn data_accessor_round_trip_while_configurable() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    let getter = realm.new_function("g", |_, _, _| Ok(SesValue::from("got")));
    realm
        .define_own_property(&o, "p", &full_access(int_val(1)))
        .unwrap();
    realm
        .define_own_property(&o, "p", &PropertyDescriptor::accessor(getter.as_object(), None))
        .unwrap();
    assert_eq!(realm.get(&o, "p").unwrap(), SesValue::from("got"));
    realm
        .define_own_property(&o, "p", &PropertyDescriptor::default().with_value(int_val(2)))
        .unwrap();
    assert_eq!(realm.get(&o, "p").unwrap(), int_val(2));
    let h = o.as_object().unwrap();
    let slot = realm.heap().get(h).unwrap().slot("p").unwrap().clone();
    assert!(matches!(slot.kind, SlotKind::Data { writable: false, .. }));
}

// ===========================================================================
// 4. Numeric slots
// ===========================================================================

#[test]
fn numeric_slots_share_one_policy() {
    let mut realm = Realm::new();
    let a = realm
        .new_array(vec![int_val(1), int_val(2), int_val(3)])
        .unwrap();
    let h = a.as_object().unwrap();
    assert_eq!(realm.heap().get(h).unwrap().numeric_policy(), None);
    realm.seal(&a).unwrap();
    assert_eq!(
        realm.heap().get(h).unwrap().numeric_policy(),
        Some(NumericPolicy {
            writable: true,
            configurable: false,
        })
    );
    for i in ["0", "1", "2"] {
        let d = realm.get_own_property_descriptor(&a, i).unwrap().unwrap();
        assert_eq!(d.configurable, Some(false));
        assert_eq!(d.writable, Some(true));
        assert_eq!(d.enumerable, Some(true));
    }
    assert_eq!(realm.keys(&a).unwrap(), vec!["0", "1", "2"]);
}

#[test]
fn numeric_and_named_keys_order() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    realm.put(&o, "b", int_val(1)).unwrap();
    realm.put(&o, "10", int_val(1)).unwrap();
    realm.put(&o, "a", int_val(1)).unwrap();
    realm.put(&o, "9", int_val(1)).unwrap();
    assert_eq!(realm.keys(&o).unwrap(), vec!["9", "10", "a", "b"]);
}

// ===========================================================================
// 5. Reserved names
// ===========================================================================

#[test]
fn reserved_suffix_rejected_everywhere() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    let bad = "TAMED_TWIN___";
    assert!(matches!(
        realm.put(&o, bad, int_val(1)),
        Err(SesError::ReservedPropertyName { .. })
    ));
    assert!(matches!(
        realm.define_own_property(&o, bad, &full_access(int_val(1))),
        Err(SesError::ReservedPropertyName { .. })
    ));
    assert!(matches!(
        realm.get(&o, bad),
        Err(SesError::ReservedPropertyName { .. })
    ));
    assert!(realm.own_keys(&o).unwrap().is_empty());
}

// ===========================================================================
// 6. Serde
// ===========================================================================

#[test]
fn descriptor_json_shape() {
    let desc = PropertyDescriptor::data(SesValue::from("v")).with_configurable(false);
    let json = serde_json::to_value(&desc).unwrap();
    assert_eq!(json["value"]["Str"], "v");
    assert_eq!(json["writable"], true);
    assert_eq!(json["configurable"], false);
    assert!(json["get"].is_null());
}

#[test]
fn value_json_round_trip_for_handles() {
    let mut realm = Realm::new();
    let o = realm.new_record();
    let text = serde_json::to_string(&o).unwrap();
    let back: SesValue = serde_json::from_str(&text).unwrap();
    assert_eq!(back, o);
}
