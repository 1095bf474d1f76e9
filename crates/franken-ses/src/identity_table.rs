//! Associative tables keyed by reference identity.
//!
//! Two storage modes, fixed at creation:
//!
//! - [`TableMode::KeyLifetime`]: the entry lives on the key object itself,
//!   in a side slot indexed by this table's [`TableId`].  The entry therefore
//!   lives exactly as long as the key.  Primitive keys are rejected.
//! - [`TableMode::TableLifetime`]: the table owns a hash map.  Primitive keys
//!   are allowed and are type-tagged, so `3` and `"3"` never collide.
//!
//! In both modes storing `Undefined` deletes the entry and reading an unknown
//! key yields `Undefined`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SesError;
use crate::realm::Realm;
use crate::value::{ObjectHandle, SesValue, number_to_string};

/// Per-realm unique table discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableMode {
    KeyLifetime,
    TableLifetime,
}

/// Normalized table-lifetime key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TableKey {
    Object(ObjectHandle),
    Undefined,
    Null,
    Bool(bool),
    /// Canonical number text; `+0` and `-0` share an entry, as do all NaNs.
    Number(String),
    Str(String),
}

impl From<&SesValue> for TableKey {
    fn from(value: &SesValue) -> Self {
        match value {
            SesValue::Undefined => Self::Undefined,
            SesValue::Null => Self::Null,
            SesValue::Bool(b) => Self::Bool(*b),
            SesValue::Number(n) => Self::Number(number_to_string(*n)),
            SesValue::Str(s) => Self::Str(s.clone()),
            SesValue::Object(h) => Self::Object(*h),
        }
    }
}

/// An identity-keyed table.  Create with [`Realm::new_identity_table`].
#[derive(Debug, Clone)]
pub struct IdentityTable {
    id: TableId,
    mode: TableMode,
    entries: HashMap<TableKey, SesValue>,
}

impl IdentityTable {
    pub(crate) fn new(id: TableId, mode: TableMode) -> Self {
        Self {
            id,
            mode,
            entries: HashMap::new(),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    /// Entries held by the table itself.  Always zero in key-lifetime mode.
    pub fn owned_len(&self) -> usize {
        self.entries.len()
    }

    /// Store `value` under `key`; `Undefined` deletes.
    pub fn set(
        &mut self,
        realm: &mut Realm,
        key: &SesValue,
        value: SesValue,
    ) -> Result<(), SesError> {
        match self.mode {
            TableMode::KeyLifetime => {
                let handle = key_object(key)?;
                realm
                    .heap
                    .get_mut(handle)?
                    .side_table_set(self.id, value);
            }
            TableMode::TableLifetime => {
                let key = TableKey::from(key);
                if value.is_undefined() {
                    self.entries.remove(&key);
                } else {
                    self.entries.insert(key, value);
                }
            }
        }
        Ok(())
    }

    /// Value stored under `key`, or `Undefined`.
    pub fn get(&self, realm: &Realm, key: &SesValue) -> Result<SesValue, SesError> {
        match self.mode {
            TableMode::KeyLifetime => {
                let handle = key_object(key)?;
                Ok(realm
                    .heap
                    .get(handle)?
                    .side_table_get(self.id)
                    .cloned()
                    .unwrap_or(SesValue::Undefined))
            }
            TableMode::TableLifetime => Ok(self
                .entries
                .get(&TableKey::from(key))
                .cloned()
                .unwrap_or(SesValue::Undefined)),
        }
    }

    pub fn contains(&self, realm: &Realm, key: &SesValue) -> Result<bool, SesError> {
        Ok(!self.get(realm, key)?.is_undefined())
    }
}

fn key_object(key: &SesValue) -> Result<ObjectHandle, SesError> {
    key.as_object().ok_or(SesError::NotAnObject {
        operation: "key-lifetime table",
        type_name: key.type_name(),
    })
}
