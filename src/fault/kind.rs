//! Failure type identity and the `Fault` capability.
//!
//! # Responsibilities
//! - Describe a failure type: identity, path, declared status, status hint, parent
//! - Expose a failure object's cause chain (typed faults and foreign errors)
//! - Classify foreign `std::error::Error` values against known types
//!
//! # Design Decisions
//! - Hierarchy is declared, not discovered: a kind names its parent explicitly
//! - Status hints are a trait (`HasStatusHint`) captured when the kind is built
//! - Foreign errors carry no metadata; they only contribute identity and text

use std::any::{type_name, TypeId};
use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

/// Path prefixes of the language platform.
pub const PLATFORM_PREFIXES: &[&str] = &["std::", "core::", "alloc::"];

/// Static description of a failure type.
#[derive(Debug, Clone, Copy)]
pub struct FaultKind {
    id: TypeId,
    path: &'static str,
    declared: Option<StatusCode>,
    hint: Option<fn() -> i32>,
    parent: Option<fn() -> FaultKind>,
}

impl FaultKind {
    /// Kind for the type `T`, with no status metadata and no parent.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            path: type_name::<T>(),
            declared: None,
            hint: None,
            parent: None,
        }
    }

    /// Kind used for foreign errors that match no known type.
    pub fn opaque() -> Self {
        Self {
            path: "core::error::Error",
            ..Self::of::<dyn Error>()
        }
    }

    /// Declare the status this type is intended to produce.
    pub fn declares(mut self, status: StatusCode) -> Self {
        self.declared = Some(status);
        self
    }

    /// Attach the status hint of `T`.
    pub fn hinted<T: HasStatusHint>(mut self) -> Self {
        self.hint = Some(T::status_hint);
        self
    }

    /// Make `P` the immediate ancestor of this kind.
    pub fn extends<P: FaultType>(mut self) -> Self {
        self.parent = Some(P::fault_kind);
        self
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type path, e.g. `my_app::orders::ValidationError`.
    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Last path segment with generic arguments removed.
    pub fn simple_name(&self) -> &'static str {
        let base = self.path.split('<').next().unwrap_or(self.path);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// True when the path starts with one of `prefixes`.
    pub fn is_within<S: AsRef<str>>(&self, prefixes: &[S]) -> bool {
        prefixes.iter().any(|p| self.path.starts_with(p.as_ref()))
    }

    pub fn declared_status(&self) -> Option<StatusCode> {
        self.declared
    }

    /// Run the status hint, if any. The raw value is not validated here.
    pub fn status_hint(&self) -> Option<i32> {
        self.hint.map(|hint| hint())
    }

    pub fn has_hint(&self) -> bool {
        self.hint.is_some()
    }

    pub fn parent(&self) -> Option<FaultKind> {
        self.parent.map(|parent| parent())
    }
}

impl PartialEq for FaultKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FaultKind {}

impl Hash for FaultKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path)
    }
}

/// Static access to a failure type's kind.
///
/// Needed for types that act as a parent in [`FaultKind::extends`].
pub trait FaultType: Sized + 'static {
    fn fault_kind() -> FaultKind {
        FaultKind::of::<Self>()
    }
}

/// A failure type that can name its intended HTTP status without registration.
///
/// Values `<= 0` or outside the valid status range mean "no answer".
pub trait HasStatusHint {
    fn status_hint() -> i32;
}

/// A failure object that can be resolved into a fault response.
pub trait Fault: fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn kind(&self) -> FaultKind;

    /// Next node of the cause chain.
    fn cause(&self) -> Option<FaultRef<'_>> {
        None
    }

    /// Human text for this node. Empty display text counts as absent.
    fn message(&self) -> Option<String> {
        non_empty(self.to_string())
    }

    /// Structured fields of this failure for the response body.
    ///
    /// `None` means the failure cannot be flattened.
    fn fields(&self) -> Option<Map<String, Value>> {
        let mut fields = Map::new();
        if let Some(message) = self.message() {
            fields.insert("message".to_string(), Value::String(message));
        }
        Some(fields)
    }
}

/// Flatten a serialisable value into response fields.
///
/// Returns `None` when serialisation fails or the value is not an object.
pub fn to_fields<T: Serialize + ?Sized>(value: &T) -> Option<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Borrowed node of a cause chain.
#[derive(Debug, Clone, Copy)]
pub enum FaultRef<'a> {
    Fault(&'a dyn Fault),
    Foreign(&'a (dyn Error + 'static)),
}

impl<'a> FaultRef<'a> {
    pub fn kind(&self) -> FaultKind {
        match self {
            FaultRef::Fault(fault) => fault.kind(),
            FaultRef::Foreign(err) => classify(*err),
        }
    }

    pub fn message(&self) -> Option<String> {
        match self {
            FaultRef::Fault(fault) => fault.message(),
            FaultRef::Foreign(err) => non_empty(err.to_string()),
        }
    }

    pub fn next(&self) -> Option<FaultRef<'a>> {
        match *self {
            FaultRef::Fault(fault) => fault.cause(),
            FaultRef::Foreign(err) => err.source().map(FaultRef::Foreign),
        }
    }

    /// Structured fields; foreign errors are opaque.
    pub fn fields(&self) -> Option<Map<String, Value>> {
        match self {
            FaultRef::Fault(fault) => fault.fields(),
            FaultRef::Foreign(_) => None,
        }
    }

    /// Whether both refer to the same object: same data address and same vtable.
    ///
    /// A wrapper and its first field share an address but not a vtable.
    pub(crate) fn same_object(&self, other: &FaultRef<'_>) -> bool {
        match (self, other) {
            (FaultRef::Fault(a), FaultRef::Fault(b)) => std::ptr::eq(*a, *b),
            (FaultRef::Foreign(a), FaultRef::Foreign(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl fmt::Display for FaultRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultRef::Fault(fault) => fmt::Display::fmt(fault, f),
            FaultRef::Foreign(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl<'a> From<&'a dyn Fault> for FaultRef<'a> {
    fn from(fault: &'a dyn Fault) -> Self {
        FaultRef::Fault(fault)
    }
}

impl<'a> From<&'a (dyn Error + 'static)> for FaultRef<'a> {
    fn from(err: &'a (dyn Error + 'static)) -> Self {
        FaultRef::Foreign(err)
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

macro_rules! classify_known {
    ($err:expr; $($ty:ty),+ $(,)?) => {
        $(
            if $err.is::<$ty>() {
                return FaultKind::of::<$ty>();
            }
        )+
    };
}

/// Identify a foreign error by downcasting against known types.
pub fn classify(err: &(dyn Error + 'static)) -> FaultKind {
    classify_known!(err;
        std::io::Error,
        std::fmt::Error,
        std::num::ParseIntError,
        std::num::ParseFloatError,
        std::num::TryFromIntError,
        std::str::Utf8Error,
        std::string::FromUtf8Error,
        std::str::ParseBoolError,
        std::char::ParseCharError,
        std::net::AddrParseError,
        std::time::SystemTimeError,
        serde_json::Error,
        toml::de::Error,
        url::ParseError,
        hyper::Error,
        hyper_util::client::legacy::Error,
        axum::Error,
        axum::http::Error,
        axum::http::uri::InvalidUri,
        tower::timeout::error::Elapsed,
        tokio::time::error::Elapsed,
    );
    FaultKind::opaque()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    impl FaultType for Base {
        fn fault_kind() -> FaultKind {
            FaultKind::of::<Self>().declares(StatusCode::CONFLICT)
        }
    }

    struct Derived;

    struct Teapot;
    impl HasStatusHint for Teapot {
        fn status_hint() -> i32 {
            418
        }
    }

    #[test]
    fn test_simple_name_strips_path_and_generics() {
        let kind = FaultKind::of::<Vec<String>>();
        assert_eq!(kind.simple_name(), "Vec");
        assert_eq!(FaultKind::of::<std::io::Error>().simple_name(), "Error");
        assert_eq!(FaultKind::of::<Base>().simple_name(), "Base");
    }

    #[test]
    fn test_platform_prefixes() {
        assert!(FaultKind::of::<std::io::Error>().is_within(PLATFORM_PREFIXES));
        assert!(FaultKind::opaque().is_within(PLATFORM_PREFIXES));
        assert!(!FaultKind::of::<Base>().is_within(PLATFORM_PREFIXES));
    }

    #[test]
    fn test_parent_and_hint() {
        let kind = FaultKind::of::<Derived>().extends::<Base>().hinted::<Teapot>();
        let parent = kind.parent().unwrap();
        assert_eq!(parent, FaultKind::of::<Base>());
        assert_eq!(parent.declared_status(), Some(StatusCode::CONFLICT));
        assert_eq!(kind.status_hint(), Some(418));
        assert!(kind.declared_status().is_none());
    }

    #[test]
    fn test_classify_foreign_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(classify(&io), FaultKind::of::<std::io::Error>());

        let parse = "x".parse::<u8>().unwrap_err();
        assert_eq!(classify(&parse).simple_name(), "ParseIntError");

        #[derive(Debug)]
        struct Unknown;
        impl fmt::Display for Unknown {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("unknown")
            }
        }
        impl Error for Unknown {}
        let kind = classify(&Unknown);
        assert_eq!(kind.simple_name(), "Error");
        assert_eq!(kind, FaultKind::opaque());
    }

    #[test]
    fn test_to_fields_requires_object() {
        #[derive(Serialize)]
        struct Payload {
            field: &'static str,
        }
        let fields = to_fields(&Payload { field: "x" }).unwrap();
        assert_eq!(fields["field"], "x");
        assert!(to_fields(&42).is_none());
    }
}
