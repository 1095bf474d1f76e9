//! Sealer/unsealer pairs: opaque boxes that only the matching unsealer opens.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SesError;
use crate::identity_table::{IdentityTable, TableMode};
use crate::object_model::PropertyDescriptor;
use crate::realm::Realm;
use crate::value::SesValue;

#[derive(Debug)]
struct Shared {
    table: RefCell<IdentityTable>,
    /// Stored in place of an `Undefined` payload, which would read as absent.
    undefined_standin: SesValue,
}

/// Wraps payloads into fresh box tokens.
#[derive(Debug, Clone)]
pub struct Sealer(Rc<Shared>);

/// Opens boxes made by the matching [`Sealer`].
#[derive(Debug, Clone)]
pub struct Unsealer(Rc<Shared>);

pub fn make_sealer_unsealer_pair(realm: &mut Realm) -> (Sealer, Unsealer) {
    let shared = Rc::new(Shared {
        table: RefCell::new(realm.new_identity_table(TableMode::KeyLifetime)),
        undefined_standin: realm.new_token("(undefined)"),
    });
    (Sealer(Rc::clone(&shared)), Unsealer(shared))
}

impl Sealer {
    pub fn seal(&self, realm: &mut Realm, payload: SesValue) -> Result<SesValue, SesError> {
        let payload = if payload.is_undefined() {
            self.0.undefined_standin.clone()
        } else {
            payload
        };
        let sealed = realm.new_token("(box)");
        self.0.table.borrow_mut().set(realm, &sealed, payload)?;
        Ok(sealed)
    }
}

impl Unsealer {
    pub fn unseal(&self, realm: &mut Realm, sealed: &SesValue) -> Result<SesValue, SesError> {
        let payload = if sealed.is_object() {
            self.0.table.borrow().get(realm, sealed)?
        } else {
            SesValue::Undefined
        };
        if payload.is_undefined() {
            let err = SesError::SealerMismatch;
            realm.emit(
                "sealer",
                "unseal",
                "mismatch",
                Some(err.stable_code()),
                sealed.to_string(),
            );
            return Err(err);
        }
        if payload == self.0.undefined_standin {
            return Ok(SesValue::Undefined);
        }
        Ok(payload)
    }
}

/// Guest-facing form: a frozen record `{seal, unseal}` of callable functions.
pub fn sealer_record(
    realm: &mut Realm,
    sealer: &Sealer,
    unsealer: &Unsealer,
) -> Result<SesValue, SesError> {
    let sealer = sealer.clone();
    let seal = realm.new_function("seal", move |realm, _, args| {
        sealer.seal(realm, args.first().cloned().unwrap_or(SesValue::Undefined))
    });
    let unsealer = unsealer.clone();
    let unseal = realm.new_function("unseal", move |realm, _, args| {
        unsealer.unseal(realm, args.first().unwrap_or(&SesValue::Undefined))
    });
    let record = realm.new_record();
    realm.define_properties(
        &record,
        &[
            ("seal", PropertyDescriptor::data(seal)),
            ("unseal", PropertyDescriptor::data(unseal)),
        ],
    )?;
    realm.freeze(&record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_unseal_round_trip_including_undefined() {
        let mut realm = Realm::new();
        let (sealer, unsealer) = make_sealer_unsealer_pair(&mut realm);
        let obj = realm.new_record();
        for payload in [SesValue::from(1), SesValue::Null, obj, SesValue::Undefined] {
            let sealed = sealer.seal(&mut realm, payload.clone()).unwrap();
            assert_eq!(unsealer.unseal(&mut realm, &sealed).unwrap(), payload);
        }
    }

    #[test]
    fn boxes_are_frozen_tokens() {
        let mut realm = Realm::new();
        let (sealer, _) = make_sealer_unsealer_pair(&mut realm);
        let sealed = sealer.seal(&mut realm, SesValue::from("secret")).unwrap();
        assert!(realm.is_frozen(&sealed).unwrap());
        assert_eq!(realm.token_name(&sealed), Some("(box)"));
        assert!(realm.own_keys(&sealed).unwrap().is_empty());
    }

    #[test]
    fn foreign_box_is_a_mismatch() {
        let mut realm = Realm::new();
        let (sealer_a, _) = make_sealer_unsealer_pair(&mut realm);
        let (_, unsealer_b) = make_sealer_unsealer_pair(&mut realm);
        let sealed = sealer_a.seal(&mut realm, SesValue::from(1)).unwrap();
        assert_eq!(
            unsealer_b.unseal(&mut realm, &sealed),
            Err(SesError::SealerMismatch)
        );
        assert_eq!(
            unsealer_b.unseal(&mut realm, &SesValue::from(1)),
            Err(SesError::SealerMismatch)
        );
        let events = realm.drain_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].error_code.as_deref(), Some("FE-SES-0018"));
    }

    #[test]
    fn guest_record_calls_through_protocol() {
        let mut realm = Realm::new();
        let (sealer, unsealer) = make_sealer_unsealer_pair(&mut realm);
        let rec = sealer_record(&mut realm, &sealer, &unsealer).unwrap();
        assert!(realm.is_frozen(&rec).unwrap());
        let seal = realm.get(&rec, "seal").unwrap();
        let unseal = realm.get(&rec, "unseal").unwrap();
        let useless = realm.useless();
        let sealed = realm
            .call(&seal, useless.clone(), &[SesValue::from("x")])
            .unwrap();
        let opened = realm.call(&unseal, useless, &[sealed]).unwrap();
        assert_eq!(opened, SesValue::from("x"));
    }
}
