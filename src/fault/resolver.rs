//! Failure type → HTTP status resolution.
//!
//! # Lookup Order
//! ```text
//! explicit registration (by type, then by name)
//!     → cached answer for the queried type
//!     → declared status
//!     → status hint
//!     → parent kind (repeat from explicit registration)
//!     → no answer (resolve() maps it to 500)
//! ```
//!
//! # Design Decisions
//! - The cache is keyed by the queried type, even when the answer came from an ancestor
//! - "No answer" is cached too; entries are never invalidated or evicted
//! - Insert-if-absent on the cache: racing writers compute the same value
//! - A type's answer is fixed at its first resolution; register statuses before
//!   the first lookup, since a later registration on an ancestor never reaches
//!   an already resolved subtype

use std::any::TypeId;
use std::panic::{catch_unwind, AssertUnwindSafe};

use axum::http::StatusCode;
use dashmap::DashMap;
use thiserror::Error;

use crate::fault::kind::FaultKind;

/// Upper bound on parent hops, in case a kind's ancestry loops.
const MAX_ANCESTRY: usize = 32;

/// Error raised by invalid status registrations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FaultError {
    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("empty failure type name")]
    EmptyName,
}

/// Resolves and caches HTTP statuses per failure type.
#[derive(Debug, Default)]
pub struct StatusResolver {
    explicit: DashMap<TypeId, StatusCode>,
    named: DashMap<String, StatusCode>,
    cache: DashMap<TypeId, Option<StatusCode>>,
}

impl StatusResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver preloaded with statuses for transport failures:
    /// timeouts → 504, client transport errors → 502.
    pub fn with_transport_defaults() -> Self {
        let resolver = Self::new();
        resolver
            .register(FaultKind::of::<tower::timeout::error::Elapsed>(), StatusCode::GATEWAY_TIMEOUT)
            .register(FaultKind::of::<tokio::time::error::Elapsed>(), StatusCode::GATEWAY_TIMEOUT)
            .register(FaultKind::of::<hyper_util::client::legacy::Error>(), StatusCode::BAD_GATEWAY)
            .register(FaultKind::of::<hyper::Error>(), StatusCode::BAD_GATEWAY);
        resolver
    }

    /// Register a status for an exact type. The last registration wins.
    pub fn register(&self, kind: FaultKind, status: StatusCode) -> &Self {
        self.explicit.insert(kind.id(), status);
        self
    }

    /// Register a raw status code for an exact type.
    pub fn register_code(&self, kind: FaultKind, code: u16) -> Result<&Self, FaultError> {
        let status = StatusCode::from_u16(code).map_err(|_| FaultError::InvalidStatus(code))?;
        Ok(self.register(kind, status))
    }

    /// Register a raw status code by type name.
    ///
    /// The name matches a kind's full path or its simple name.
    pub fn register_named(&self, name: impl Into<String>, code: u16) -> Result<&Self, FaultError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FaultError::EmptyName);
        }
        let status = StatusCode::from_u16(code).map_err(|_| FaultError::InvalidStatus(code))?;
        self.named.insert(name, status);
        Ok(self)
    }

    /// Status for `kind`, or 500 when nothing answers.
    pub fn resolve(&self, kind: &FaultKind) -> StatusCode {
        self.lookup(kind).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Like [`resolve`](Self::resolve), for an absent type. Nothing is cached for `None`.
    pub fn resolve_opt(&self, kind: Option<&FaultKind>) -> StatusCode {
        match kind {
            Some(kind) => self.resolve(kind),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Explicit answer for `kind`, or `None` when only the default would apply.
    pub fn lookup(&self, kind: &FaultKind) -> Option<StatusCode> {
        if let Some(status) = self.registered(kind) {
            return Some(status);
        }

        let cached = self.cache.get(&kind.id()).map(|entry| *entry.value());
        if let Some(answer) = cached {
            return answer;
        }

        let answer = self.walk_ancestry(kind);
        *self.cache.entry(kind.id()).or_insert(answer)
    }

    /// Number of types with a cached answer.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn registered(&self, kind: &FaultKind) -> Option<StatusCode> {
        if let Some(status) = self.explicit.get(&kind.id()) {
            return Some(*status);
        }
        if self.named.is_empty() {
            return None;
        }
        self.named
            .get(kind.path())
            .or_else(|| self.named.get(kind.simple_name()))
            .map(|status| *status)
    }

    fn walk_ancestry(&self, kind: &FaultKind) -> Option<StatusCode> {
        let mut current = Some(*kind);
        let mut hops = 0;

        while let Some(k) = current {
            if hops > 0 {
                if let Some(status) = self.registered(&k) {
                    return Some(status);
                }
                let cached = self.cache.get(&k.id()).map(|entry| *entry.value());
                if let Some(answer) = cached {
                    return answer;
                }
            }
            if let Some(status) = k.declared_status() {
                return Some(status);
            }
            if let Some(status) = hinted_status(&k) {
                return Some(status);
            }

            hops += 1;
            if hops > MAX_ANCESTRY {
                tracing::warn!(kind = %kind, "Failure ancestry too deep; giving up");
                break;
            }
            current = k.parent();
        }
        None
    }
}

/// Run the kind's status hint. Panics and out-of-range values are "no answer".
fn hinted_status(kind: &FaultKind) -> Option<StatusCode> {
    if !kind.has_hint() {
        return None;
    }
    let raw = match catch_unwind(AssertUnwindSafe(|| kind.status_hint())) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(_) => {
            tracing::debug!(kind = %kind, "Status hint panicked; ignoring");
            return None;
        }
    };
    if raw <= 0 {
        return None;
    }
    u16::try_from(raw)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::kind::{FaultType, HasStatusHint};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BaseError;
    impl FaultType for BaseError {}

    struct SubError;
    impl FaultType for SubError {
        fn fault_kind() -> FaultKind {
            FaultKind::of::<Self>().extends::<BaseError>()
        }
    }

    static HINT_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Hinted;
    impl HasStatusHint for Hinted {
        fn status_hint() -> i32 {
            HINT_CALLS.fetch_add(1, Ordering::SeqCst);
            403
        }
    }

    struct Negative;
    impl HasStatusHint for Negative {
        fn status_hint() -> i32 {
            -1
        }
    }

    struct OutOfRange;
    impl HasStatusHint for OutOfRange {
        fn status_hint() -> i32 {
            70_000
        }
    }

    struct Panicking;
    impl HasStatusHint for Panicking {
        fn status_hint() -> i32 {
            panic!("hint failed")
        }
    }

    struct Declared;
    struct Unknown;

    #[test]
    fn test_default_is_internal_server_error() {
        let resolver = StatusResolver::new();
        let kind = FaultKind::of::<Unknown>();
        assert_eq!(resolver.lookup(&kind), None);
        assert_eq!(resolver.resolve(&kind), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resolver.resolve_opt(None), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_absent_type_is_not_cached() {
        let resolver = StatusResolver::new();
        resolver.resolve_opt(None);
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_explicit_registration_wins_over_declaration() {
        let resolver = StatusResolver::new();
        let kind = FaultKind::of::<Declared>().declares(StatusCode::BAD_REQUEST);
        assert_eq!(resolver.resolve(&kind), StatusCode::BAD_REQUEST);

        resolver.register(kind, StatusCode::CONFLICT);
        assert_eq!(resolver.resolve(&kind), StatusCode::CONFLICT);

        resolver.register(kind, StatusCode::GONE);
        assert_eq!(resolver.resolve(&kind), StatusCode::GONE);
    }

    #[test]
    fn test_ancestor_walk_caches_under_subtype() {
        let resolver = StatusResolver::new();
        resolver.register(BaseError::fault_kind(), StatusCode::UNPROCESSABLE_ENTITY);

        let sub = SubError::fault_kind();
        assert_eq!(resolver.resolve(&sub), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            resolver.cache.get(&sub.id()).map(|e| *e.value()),
            Some(Some(StatusCode::UNPROCESSABLE_ENTITY))
        );
    }

    #[test]
    fn test_hint_runs_once() {
        let resolver = StatusResolver::new();
        let kind = FaultKind::of::<Hinted>().hinted::<Hinted>();
        let before = HINT_CALLS.load(Ordering::SeqCst);
        for _ in 0..10 {
            assert_eq!(resolver.resolve(&kind), StatusCode::FORBIDDEN);
        }
        assert_eq!(HINT_CALLS.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn test_bad_hints_are_no_answer() {
        let resolver = StatusResolver::new();
        for kind in [
            FaultKind::of::<Negative>().hinted::<Negative>(),
            FaultKind::of::<OutOfRange>().hinted::<OutOfRange>(),
            FaultKind::of::<Panicking>().hinted::<Panicking>(),
        ] {
            assert_eq!(resolver.lookup(&kind), None);
        }
    }

    #[test]
    fn test_hint_falls_through_to_parent() {
        let resolver = StatusResolver::new();
        resolver.register(BaseError::fault_kind(), StatusCode::NOT_FOUND);
        let kind = FaultKind::of::<Negative>().hinted::<Negative>().extends::<BaseError>();
        assert_eq!(resolver.resolve(&kind), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_answer_is_fixed_at_first_resolution() {
        let resolver = StatusResolver::new();
        let sub = SubError::fault_kind();
        assert_eq!(resolver.lookup(&sub), None);

        resolver.register(BaseError::fault_kind(), StatusCode::GONE);
        assert_eq!(resolver.lookup(&sub), None);

        // Exact registrations are consulted before the cache
        resolver.register(sub, StatusCode::CONFLICT);
        assert_eq!(resolver.lookup(&sub), Some(StatusCode::CONFLICT));
    }

    static BASE_HINT_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Unavailable;
    impl HasStatusHint for Unavailable {
        fn status_hint() -> i32 {
            BASE_HINT_CALLS.fetch_add(1, Ordering::SeqCst);
            503
        }
    }

    struct HintedBase;
    impl FaultType for HintedBase {
        fn fault_kind() -> FaultKind {
            FaultKind::of::<Self>().hinted::<Unavailable>()
        }
    }

    struct HintedSub;

    #[test]
    fn test_concurrent_resolution_converges() {
        const WORKERS: usize = 8;
        let resolver = StatusResolver::new();
        let sub = FaultKind::of::<HintedSub>().extends::<HintedBase>();

        let statuses: Vec<StatusCode> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..WORKERS)
                .map(|_| {
                    scope.spawn(|| {
                        let first = resolver.resolve(&sub);
                        for _ in 0..100 {
                            assert_eq!(resolver.resolve(&sub), first);
                        }
                        first
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(statuses.iter().all(|s| *s == StatusCode::SERVICE_UNAVAILABLE));
        // Only the queried subtype is cached, never its ancestor
        assert_eq!(resolver.cached(), 1);
        let calls = BASE_HINT_CALLS.load(Ordering::SeqCst);
        assert!((1..=WORKERS).contains(&calls), "hint ran {calls} times");
    }

    #[test]
    fn test_named_registration() {
        let resolver = StatusResolver::new();
        resolver.register_named("Unknown", 409).unwrap();
        assert_eq!(resolver.resolve(&FaultKind::of::<Unknown>()), StatusCode::CONFLICT);

        assert_eq!(
            resolver.register_named("  ", 409).unwrap_err(),
            FaultError::EmptyName
        );
        assert_eq!(
            resolver.register_named("Unknown", 42).unwrap_err(),
            FaultError::InvalidStatus(42)
        );
        assert_eq!(
            resolver.register_code(FaultKind::of::<Unknown>(), 1000).unwrap_err(),
            FaultError::InvalidStatus(1000)
        );
    }

    #[test]
    fn test_transport_defaults() {
        let resolver = StatusResolver::with_transport_defaults();
        let elapsed = FaultKind::of::<tower::timeout::error::Elapsed>();
        assert_eq!(resolver.resolve(&elapsed), StatusCode::GATEWAY_TIMEOUT);
    }
}
