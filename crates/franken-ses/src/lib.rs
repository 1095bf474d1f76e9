#![forbid(unsafe_code)]

//! Object-capability core for sharing one object graph between trusted host
//! code and untrusted guest code.
//!
//! A [`Realm`] owns the heap, the taming membrane and the diagnostics.  Guest
//! property access goes through the object protocol (`Realm::get`,
//! `Realm::put`, ...); values crossing the host/guest boundary go through
//! `Realm::tame`/`Realm::untame`; capability checks use [`guard`] and
//! [`sealer`].

pub mod ejector;
pub mod error;
pub mod guard;
pub mod identity_table;
pub mod json_bridge;
pub mod membrane;
pub mod object_model;
pub mod object_protocol;
pub mod realm;
pub mod sealer;
pub mod value;

pub use ejector::{Ejector, call_with_ejector};
pub use error::SesError;
pub use guard::{Guard, Trademark, coerce, make_trademark, new_guard, passes_guard, stamp};
pub use identity_table::{IdentityTable, TableMode};
pub use membrane::TwinConversion;
pub use object_model::PropertyDescriptor;
pub use object_protocol::Strictness;
pub use realm::{Realm, RealmConfig, RealmEvent};
pub use sealer::{Sealer, Unsealer, make_sealer_unsealer_pair};
pub use value::{ObjectHandle, SesValue};
