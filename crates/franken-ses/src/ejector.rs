//! Single-use escape procedures.
//!
//! Firing an ejector stashes a value and returns the uncatchable
//! [`SesError::Ejection`] tagged with the ejector's id.  The error travels up
//! through `?` like any other, guest `catch` handlers refuse to intercept it
//! (see [`Realm::try_guest`]), and [`call_with_ejector`] recognizes its own
//! ejection and runs the failure continuation.  Ids are only unique within a
//! realm, so recognition also requires that this ejector's own state holds a
//! stash.
//!
//! The ejector is disabled when the attempt exits by any path.  The disable
//! happens in a drop guard, so it also runs on unwinding.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SesError;
use crate::realm::Realm;
use crate::value::SesValue;

#[derive(Debug, Default)]
struct EjectorState {
    disabled: bool,
    stash: Option<SesValue>,
}

/// Handle on a live (or spent) escape procedure.
#[derive(Debug, Clone)]
pub struct Ejector {
    id: u64,
    state: Rc<RefCell<EjectorState>>,
}

impl Ejector {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: Rc::new(RefCell::new(EjectorState::default())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_disabled(&self) -> bool {
        self.state.borrow().disabled
    }

    /// Escape with `result`.  Never returns `Ok`.
    ///
    /// A disabled ejector yields the ordinary `EjectorDisabled` error instead.
    pub fn eject<T>(&self, result: SesValue) -> Result<T, SesError> {
        let mut state = self.state.borrow_mut();
        if state.disabled {
            return Err(SesError::EjectorDisabled);
        }
        state.stash = Some(result);
        Err(SesError::Ejection {
            ejector_id: self.id,
        })
    }

    fn disable(&self) {
        self.state.borrow_mut().disabled = true;
    }

    fn has_fired(&self) -> bool {
        self.state.borrow().stash.is_some()
    }

    fn take_stash(&self) -> SesValue {
        self.state
            .borrow_mut()
            .stash
            .take()
            .unwrap_or(SesValue::Undefined)
    }
}

/// Disables its ejector when the attempt's scope ends.
struct LiveEjector<'a>(&'a Ejector);

impl Drop for LiveEjector<'_> {
    fn drop(&mut self) {
        self.0.disable();
    }
}

/// Escape through `ejector`, or raise [`SesError::GuardFailure`] when there
/// is none.
pub fn eject<T>(ejector: Option<&Ejector>, result: SesValue) -> Result<T, SesError> {
    match ejector {
        Some(ej) => ej.eject(result),
        None => Err(SesError::GuardFailure(result)),
    }
}

/// Run `attempt` with a fresh ejector.
///
/// If that ejector fires, `on_fail` receives the stashed value and its
/// outcome is the result.  Any other error, including ejections belonging to
/// outer ejectors, propagates unchanged.
pub fn call_with_ejector<T>(
    realm: &mut Realm,
    attempt: impl FnOnce(&mut Realm, &Ejector) -> Result<T, SesError>,
    on_fail: impl FnOnce(&mut Realm, SesValue) -> Result<T, SesError>,
) -> Result<T, SesError> {
    let ejector = Ejector::new(realm.next_ejector_id());
    let outcome = {
        let _live = LiveEjector(&ejector);
        attempt(realm, &ejector)
    };
    match outcome {
        Err(SesError::Ejection { ejector_id })
            if ejector_id == ejector.id && ejector.has_fired() =>
        {
            let stash = ejector.take_stash();
            realm.emit(
                "ejector",
                "ejection",
                "caught",
                None,
                format!("ejector #{ejector_id}: {stash}"),
            );
            on_fail(realm, stash)
        }
        other => other,
    }
}
