#![no_main]

use frankenengine_ses::{PropertyDescriptor, Realm, SesValue, Strictness};
use libfuzzer_sys::fuzz_target;

const MAX_STEPS: usize = 96;
const NAMES: [&str; 5] = ["a", "b", "c", "0", "1"];

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut realm = Realm::new();
    let obj = realm.new_record();
    let getter = realm.new_function("g", |_, _, _| Ok(SesValue::from(1)));
    let mut frozen_snapshot = None;

    for (index, op) in data.iter().copied().take(MAX_STEPS).enumerate() {
        let name = NAMES[usize::from(byte(data, index + 1)) % NAMES.len()];
        let value = SesValue::from(i32::from(byte(data, index + 2)));
        match op % 8 {
            0 => {
                let _ = realm.put(&obj, name, value);
            }
            1 => {
                let desc = descriptor(byte(data, index + 3), value, &getter);
                let _ = realm.define_own_property(&obj, name, &desc);
            }
            2 => {
                let _ = realm.delete_property(&obj, name, Strictness::Sloppy);
            }
            3 => {
                let _ = realm.prevent_extensions(&obj);
            }
            4 => {
                let _ = realm.seal(&obj);
            }
            5 => {
                let _ = realm.freeze(&obj);
            }
            6 => {
                let _ = realm.get(&obj, name);
            }
            _ => {
                let _ = realm.tame(&obj);
            }
        }

        if realm.is_frozen(&obj).unwrap_or(false) {
            let now = snapshot(&realm, &obj);
            match &frozen_snapshot {
                Some(before) => assert_eq!(before, &now, "frozen object changed"),
                None => frozen_snapshot = Some(now),
            }
            assert!(!realm.is_extensible(&obj).unwrap_or(true));
            assert!(realm.is_sealed(&obj).unwrap_or(false));
        }
    }
});

fn descriptor(bits: u8, value: SesValue, getter: &SesValue) -> PropertyDescriptor {
    let mut desc = if bits & 1 == 0 {
        PropertyDescriptor::default().with_value(value)
    } else {
        PropertyDescriptor::accessor(getter.as_object(), None)
    };
    if bits & 2 != 0 && bits & 1 == 0 {
        desc = desc.with_writable(bits & 4 != 0);
    }
    if bits & 8 != 0 {
        desc = desc.with_enumerable(bits & 16 != 0);
    }
    if bits & 32 != 0 {
        desc = desc.with_configurable(bits & 64 != 0);
    }
    desc
}

fn snapshot(realm: &Realm, obj: &SesValue) -> Vec<(String, Option<PropertyDescriptor>)> {
    realm
        .own_keys(obj)
        .unwrap_or_default()
        .into_iter()
        .map(|k| {
            let d = realm.get_own_property_descriptor(obj, &k).ok().flatten();
            (k, d)
        })
        .collect()
}

fn byte(data: &[u8], index: usize) -> u8 {
    data[index % data.len()]
}
