//! Error taxonomy for the object protocol, membrane and capability layers.
//!
//! Every variant maps to a permanent stable code (`FE-SES-NNNN`).  A subset of
//! errors is *uncatchable*: guest-level exception handling must never
//! intercept them, see [`SesError::is_uncatchable`].

use thiserror::Error;

use crate::value::{ObjectHandle, SesValue};

pub const ERROR_NOT_EXTENSIBLE: &str = "FE-SES-0001";
pub const ERROR_NOT_WRITABLE: &str = "FE-SES-0002";
pub const ERROR_NOT_CONFIGURABLE: &str = "FE-SES-0003";
pub const ERROR_RESERVED_NAME: &str = "FE-SES-0004";
pub const ERROR_NUMERIC_REDEFINITION: &str = "FE-SES-0005";
pub const ERROR_INVALID_DESCRIPTOR: &str = "FE-SES-0006";
pub const ERROR_OBJECT_NOT_FOUND: &str = "FE-SES-0007";
pub const ERROR_NOT_AN_OBJECT: &str = "FE-SES-0008";
pub const ERROR_PROTOTYPE_CHAIN: &str = "FE-SES-0009";
pub const ERROR_NOT_CALLABLE: &str = "FE-SES-0010";
pub const ERROR_TWIN_CONFLICT: &str = "FE-SES-0011";
pub const ERROR_UNEXPECTED_PRIMITIVE: &str = "FE-SES-0012";
pub const ERROR_STAMP_PRECONDITION: &str = "FE-SES-0013";
pub const ERROR_NOT_A_GUARD: &str = "FE-SES-0014";
pub const ERROR_GUARD_FAILURE: &str = "FE-SES-0015";
pub const ERROR_EJECTOR_DISABLED: &str = "FE-SES-0016";
pub const ERROR_EJECTION: &str = "FE-SES-0017";
pub const ERROR_SEALER_MISMATCH: &str = "FE-SES-0018";
pub const ERROR_TOXIC_FUNCTION: &str = "FE-SES-0019";
pub const ERROR_GLOBAL_LEAK: &str = "FE-SES-0020";
pub const ERROR_THROWN: &str = "FE-SES-0021";
pub const ERROR_JSON: &str = "FE-SES-0022";
pub const ERROR_CONVERSION_TOO_DEEP: &str = "FE-SES-0023";

/// Errors surfaced by realm operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SesError {
    #[error("TypeError: cannot add property '{name}': object is not extensible")]
    NotExtensible { name: String },
    #[error("TypeError: the property '{name}' is not writable")]
    NotWritable { name: String },
    #[error("TypeError: the property '{name}' is not configurable")]
    NotConfigurable { name: String },
    #[error("TypeError: property names may not end in double underscore: '{name}'")]
    ReservedPropertyName { name: String },
    #[error("TypeError: cannot define numeric property '{name}'")]
    NumericRedefinition { name: String },
    #[error("TypeError: invalid property descriptor: {reason}")]
    InvalidDescriptor { reason: String },
    #[error("{0} not found")]
    ObjectNotFound(ObjectHandle),
    #[error("TypeError: {operation} expects an object, got {type_name}")]
    NotAnObject {
        operation: &'static str,
        type_name: &'static str,
    },
    #[error("TypeError: prototype chain cycle detected")]
    PrototypeCycleDetected,
    #[error("TypeError: prototype chain depth {depth} exceeds max {max}")]
    PrototypeChainTooDeep { depth: u32, max: u32 },
    #[error("TypeError: {0} is not a function")]
    NotCallable(SesValue),
    #[error("TypeError: already tames to something: {0}")]
    AlreadyTamesTo(ObjectHandle),
    #[error("TypeError: already untames to something: {0}")]
    AlreadyUntamesTo(ObjectHandle),
    #[error("TypeError: already tame: {0}")]
    AlreadyTame(ObjectHandle),
    #[error("TypeError: already feral: {0}")]
    AlreadyFeral(ObjectHandle),
    #[error("TypeError: unexpected {side} primitive: {value}")]
    UnexpectedPrimitive { side: &'static str, value: SesValue },
    #[error("TypeError: can only stamp records: {0}")]
    NotARecord(SesValue),
    #[error("TypeError: can't stamp frozen objects: {0}")]
    FrozenRecord(ObjectHandle),
    #[error("TypeError: can't stamp with a non-stamp: {0}")]
    NotAStamp(SesValue),
    #[error("TypeError: specimen is not a guard: {0}")]
    NotAGuard(SesValue),
    #[error("{0}")]
    GuardFailure(SesValue),
    #[error("ejector disabled")]
    EjectorDisabled,
    #[error("ejection #{ejector_id} in flight")]
    Ejection { ejector_id: u64 },
    #[error("TypeError: sealer/unsealer mismatch")]
    SealerMismatch,
    #[error("Internal: toxic function encountered: {name}")]
    ToxicFunction { name: String },
    #[error("Internal: global object leaked")]
    GlobalLeak,
    #[error("Internal: global object almost leaked")]
    GlobalAlmostLeaked,
    #[error("uncaught guest exception: {0}")]
    Thrown(SesValue),
    #[error("json: {0}")]
    Json(String),
    #[error("RangeError: object graph nesting exceeds max depth {max}")]
    ConversionTooDeep { max: u32 },
}

impl SesError {
    pub fn stable_code(&self) -> &'static str {
        match self {
            Self::NotExtensible { .. } => ERROR_NOT_EXTENSIBLE,
            Self::NotWritable { .. } => ERROR_NOT_WRITABLE,
            Self::NotConfigurable { .. } => ERROR_NOT_CONFIGURABLE,
            Self::ReservedPropertyName { .. } => ERROR_RESERVED_NAME,
            Self::NumericRedefinition { .. } => ERROR_NUMERIC_REDEFINITION,
            Self::InvalidDescriptor { .. } => ERROR_INVALID_DESCRIPTOR,
            Self::ObjectNotFound(_) => ERROR_OBJECT_NOT_FOUND,
            Self::NotAnObject { .. } => ERROR_NOT_AN_OBJECT,
            Self::PrototypeCycleDetected | Self::PrototypeChainTooDeep { .. } => {
                ERROR_PROTOTYPE_CHAIN
            }
            Self::NotCallable(_) => ERROR_NOT_CALLABLE,
            Self::AlreadyTamesTo(_)
            | Self::AlreadyUntamesTo(_)
            | Self::AlreadyTame(_)
            | Self::AlreadyFeral(_) => ERROR_TWIN_CONFLICT,
            Self::UnexpectedPrimitive { .. } => ERROR_UNEXPECTED_PRIMITIVE,
            Self::NotARecord(_) | Self::FrozenRecord(_) | Self::NotAStamp(_) => {
                ERROR_STAMP_PRECONDITION
            }
            Self::NotAGuard(_) => ERROR_NOT_A_GUARD,
            Self::GuardFailure(_) => ERROR_GUARD_FAILURE,
            Self::EjectorDisabled => ERROR_EJECTOR_DISABLED,
            Self::Ejection { .. } => ERROR_EJECTION,
            Self::SealerMismatch => ERROR_SEALER_MISMATCH,
            Self::ToxicFunction { .. } => ERROR_TOXIC_FUNCTION,
            Self::GlobalLeak | Self::GlobalAlmostLeaked => ERROR_GLOBAL_LEAK,
            Self::Thrown(_) => ERROR_THROWN,
            Self::Json(_) => ERROR_JSON,
            Self::ConversionTooDeep { .. } => ERROR_CONVERSION_TOO_DEEP,
        }
    }

    /// Uncatchable errors propagate straight to the host; guest `catch`
    /// clauses never observe them.
    pub fn is_uncatchable(&self) -> bool {
        matches!(
            self,
            Self::Ejection { .. } | Self::ToxicFunction { .. } | Self::GlobalLeak
        )
    }

    /// Guest-visible error class name used when taming the error.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::GuardFailure(_)
            | Self::EjectorDisabled
            | Self::ObjectNotFound(_)
            | Self::GlobalAlmostLeaked
            | Self::Json(_)
            | Self::Thrown(_) => "Error",
            Self::ConversionTooDeep { .. } => "RangeError",
            _ => "TypeError",
        }
    }
}
