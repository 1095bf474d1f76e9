//! The realm: one isolated runtime owning a heap, a membrane and its
//! diagnostics.
//!
//! Nothing here is process-global.  The log hook, the identity-table
//! discriminator counter and the ejector counter are realm fields, so several
//! realms can coexist in one process and be dropped independently.
//!
//! Diagnostics come in two forms: a replaceable free-text logger
//! ([`Realm::set_logger`]) and structured [`RealmEvent`] records drained with
//! [`Realm::drain_events`].

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::SesError;
use crate::guard::{self, Trademark};
use crate::identity_table::{IdentityTable, TableId, TableMode};
use crate::membrane::{DEFAULT_MAX_CONVERSION_DEPTH, Membrane};
use crate::object_model::{
    DEFAULT_MAX_PROTOTYPE_DEPTH, FunctionObject, ObjectHeap, ObjectKind, PropertyDescriptor,
};
use crate::value::{ObjectHandle, SesValue};

// ---------------------------------------------------------------------------
// RealmConfig
// ---------------------------------------------------------------------------

/// Realm construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmConfig {
    /// Copied onto every emitted event.
    pub trace_id: String,
    /// When false, [`RealmEvent`]s are not retained (the logger still runs).
    pub record_events: bool,
    pub max_prototype_depth: u32,
    /// Deepest object nesting that membrane conversion and JSON output will
    /// walk before failing with `ConversionTooDeep`.
    pub max_conversion_depth: u32,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            trace_id: "ses-realm".to_string(),
            record_events: true,
            max_prototype_depth: DEFAULT_MAX_PROTOTYPE_DEPTH,
            max_conversion_depth: DEFAULT_MAX_CONVERSION_DEPTH,
        }
    }
}

impl RealmConfig {
    /// Parse a config from JSON; absent fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, SesError> {
        serde_json::from_str(text).map_err(|e| SesError::Json(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// RealmEvent
// ---------------------------------------------------------------------------

/// Structured diagnostic emitted by membrane and capability operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmEvent {
    pub sequence: u64,
    pub trace_id: String,
    pub component: String,
    pub event: String,
    pub outcome: String,
    pub error_code: Option<String>,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Realm
// ---------------------------------------------------------------------------

type Logger = Box<dyn FnMut(&str)>;

/// An isolated host/guest runtime.
pub struct Realm {
    config: RealmConfig,
    pub(crate) heap: ObjectHeap,
    pub(crate) membrane: Membrane,
    logger: Option<Logger>,
    events: Vec<RealmEvent>,
    next_sequence: u64,
    next_table_id: u64,
    next_ejector_id: u64,
    useless: ObjectHandle,
    no_result: ObjectHandle,
    guard_mark: Trademark,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl Realm {
    pub fn new() -> Self {
        Self::with_config(RealmConfig::default())
    }

    pub fn with_config(config: RealmConfig) -> Self {
        let mut heap = ObjectHeap::with_max_depth(config.max_prototype_depth);
        let useless = heap.alloc_frozen(ObjectKind::Token {
            name: "USELESS".to_string(),
        });
        let no_result = heap.alloc_frozen(ObjectKind::Token {
            name: "NO_RESULT".to_string(),
        });
        let guard_table = TableId(1);
        let guard_mark = guard::bootstrap_guard_trademark(&mut heap, guard_table);
        Self {
            config,
            heap,
            membrane: Membrane::default(),
            logger: None,
            events: Vec::new(),
            next_sequence: 0,
            next_table_id: guard_table.0 + 1,
            next_ejector_id: 1,
            useless,
            no_result,
            guard_mark,
        }
    }

    pub fn config(&self) -> &RealmConfig {
        &self.config
    }

    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    // -- Diagnostics ----------------------------------------------------------

    /// Replace the log hook.  Last writer wins.
    pub fn set_logger(&mut self, logger: impl FnMut(&str) + 'static) {
        self.logger = Some(Box::new(logger));
    }

    /// Restore the default no-op hook.
    pub fn clear_logger(&mut self) {
        self.logger = None;
    }

    pub fn log(&mut self, message: &str) {
        if let Some(logger) = self.logger.as_mut() {
            logger(message);
        }
    }

    pub(crate) fn emit(
        &mut self,
        component: &str,
        event: &str,
        outcome: &str,
        error_code: Option<&str>,
        detail: String,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        if !self.config.record_events {
            return;
        }
        self.events.push(RealmEvent {
            sequence,
            trace_id: self.config.trace_id.clone(),
            component: component.to_string(),
            event: event.to_string(),
            outcome: outcome.to_string(),
            error_code: error_code.map(str::to_string),
            detail,
        });
    }

    /// Drain accumulated events.
    pub fn drain_events(&mut self) -> Vec<RealmEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    // -- Counters -------------------------------------------------------------

    pub(crate) fn next_table_id(&mut self) -> TableId {
        let id = TableId(self.next_table_id);
        self.next_table_id += 1;
        id
    }

    pub(crate) fn next_ejector_id(&mut self) -> u64 {
        let id = self.next_ejector_id;
        self.next_ejector_id += 1;
        id
    }

    pub fn new_identity_table(&mut self, mode: TableMode) -> IdentityTable {
        let id = self.next_table_id();
        IdentityTable::new(id, mode)
    }

    // -- Well-known values ----------------------------------------------------

    /// Stand-in `this` when nothing more suitable exists.
    pub fn useless(&self) -> SesValue {
        SesValue::Object(self.useless)
    }

    /// Explicit "no result" marker for guest-facing conversion failure.
    pub fn no_result(&self) -> SesValue {
        SesValue::Object(self.no_result)
    }

    /// The realm's `Guard` trademark.  Its guard accepts registered guards.
    pub fn guard_trademark(&self) -> &Trademark {
        &self.guard_mark
    }

    // -- Allocation -----------------------------------------------------------

    /// A frozen identity carrying only a diagnostic name.
    pub fn new_token(&mut self, name: &str) -> SesValue {
        SesValue::Object(self.heap.alloc_frozen(ObjectKind::Token {
            name: name.to_string(),
        }))
    }

    /// An empty, extensible record.
    pub fn new_record(&mut self) -> SesValue {
        SesValue::Object(self.heap.alloc(ObjectKind::Record, None))
    }

    /// An extensible array holding `items` at `"0"`, `"1"`, ...
    pub fn new_array(&mut self, items: Vec<SesValue>) -> Result<SesValue, SesError> {
        let handle = self.heap.alloc(ObjectKind::Array, None);
        let obj = self.heap.get_mut(handle)?;
        for (i, item) in items.into_iter().enumerate() {
            obj.write_element(&i.to_string(), item);
        }
        Ok(SesValue::Object(handle))
    }

    /// A frozen function that guest code may call.
    pub fn new_function<F>(&mut self, name: &str, behavior: F) -> SesValue
    where
        F: Fn(&mut Realm, SesValue, &[SesValue]) -> Result<SesValue, SesError> + 'static,
    {
        let handle = self.heap.alloc_frozen(ObjectKind::Function(FunctionObject {
            name: name.to_string(),
            marked: true,
            behavior: Rc::new(behavior),
        }));
        SesValue::Object(handle)
    }

    /// A host-only function.  Invoking it through the object protocol is an
    /// uncatchable fault.
    pub fn new_unmarked_function<F>(&mut self, name: &str, behavior: F) -> SesValue
    where
        F: Fn(&mut Realm, SesValue, &[SesValue]) -> Result<SesValue, SesError> + 'static,
    {
        let handle = self.heap.alloc(
            ObjectKind::Function(FunctionObject {
                name: name.to_string(),
                marked: false,
                behavior: Rc::new(behavior),
            }),
            None,
        );
        SesValue::Object(handle)
    }

    /// Diagnostic name of a token, if `value` is one.
    pub fn token_name(&self, value: &SesValue) -> Option<&str> {
        let obj = self.heap.get(value.as_object()?).ok()?;
        match &obj.kind {
            ObjectKind::Token { name } => Some(name),
            _ => None,
        }
    }

    // -- Exceptions -----------------------------------------------------------

    /// Convert an error caught on behalf of guest code into the value the
    /// guest `catch` clause receives.
    ///
    /// Uncatchable errors are handed straight back as `Err`.  Otherwise this
    /// never fails: if the conversion itself trips, the guest sees a fixed
    /// diagnostic string.
    pub fn tame_exception(&mut self, err: SesError) -> Result<SesValue, SesError> {
        if err.is_uncatchable() {
            self.emit(
                "realm",
                "tame_exception",
                "rethrown",
                Some(err.stable_code()),
                err.to_string(),
            );
            return Err(err);
        }
        match self.tame_caught(err) {
            Ok(value) => Ok(value),
            Err(_) => {
                self.log("Exception during exception handling.");
                Ok(SesValue::from("Exception during exception handling."))
            }
        }
    }

    fn tame_caught(&mut self, err: SesError) -> Result<SesValue, SesError> {
        let thrown = match err {
            SesError::Thrown(value) => value,
            host => return self.error_record(&host),
        };
        let Some(handle) = thrown.as_object() else {
            return Ok(thrown);
        };
        let obj = self.heap.get(handle)?;
        let thrown_function = match &obj.kind {
            ObjectKind::Token { .. } => return Ok(thrown),
            ObjectKind::Record => None,
            ObjectKind::Function(func) => Some(func.name.clone()),
            _ => return Ok(SesValue::Str(thrown.to_string())),
        };
        let Some(thrown_function) = thrown_function else {
            self.heap.get_mut(handle)?.freeze();
            return Ok(thrown);
        };
        // Hand back a powerless stand-in, never the thrown function itself.
        let message = format!("In lieu of thrown function: {thrown_function}");
        Ok(self.new_function(&thrown_function, move |_, _, _| {
            Ok(SesValue::from(message.as_str()))
        }))
    }

    /// Frozen `{name, message, code}` record describing a host error.
    fn error_record(&mut self, err: &SesError) -> Result<SesValue, SesError> {
        let handle = self.heap.alloc(ObjectKind::Record, None);
        let fields = [
            ("name", SesValue::from(err.class_name())),
            ("message", SesValue::from(err.to_string())),
            ("code", SesValue::from(err.stable_code())),
        ];
        for (name, value) in fields {
            self.heap
                .define_own_property(handle, name, &PropertyDescriptor::data(value))?;
        }
        self.heap.get_mut(handle)?.freeze();
        Ok(SesValue::Object(handle))
    }

    /// Guest-level `try { body } catch (e) { handler(e) }`.
    ///
    /// `handler` sees the tamed exception; uncatchable errors bypass it.
    pub fn try_guest<T>(
        &mut self,
        body: impl FnOnce(&mut Realm) -> Result<T, SesError>,
        handler: impl FnOnce(&mut Realm, SesValue) -> Result<T, SesError>,
    ) -> Result<T, SesError> {
        match body(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                let caught = self.tame_exception(err)?;
                handler(self, caught)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
