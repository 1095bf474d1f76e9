#![no_main]

use frankenengine_ses::{Realm, SesValue};
use libfuzzer_sys::fuzz_target;

const MAX_NODES: usize = 16;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut realm = Realm::new();
    let count = usize::from(data[0]) % MAX_NODES + 1;
    let nodes: Vec<SesValue> = (0..count).map(|_| realm.new_record()).collect();

    for (index, edge) in data.iter().copied().enumerate().skip(1) {
        let from = &nodes[usize::from(edge) % count];
        let to = nodes[usize::from(byte(data, index + 1)) % count].clone();
        let name = format!("p{}", edge % 4);
        let _ = realm.put(from, &name, to);
        if edge % 5 == 0 {
            let _ = realm.freeze(from);
        }
    }

    for node in &nodes {
        let Ok(Some(tamed)) = realm.tame(node) else {
            continue;
        };
        assert_eq!(realm.untame(&tamed).ok().flatten().as_ref(), Some(node));
        assert_eq!(realm.tame(node).ok().flatten(), Some(tamed));
    }
});

fn byte(data: &[u8], index: usize) -> u8 {
    data[index % data.len()]
}
