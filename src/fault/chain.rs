//! Cause-chain traversal.
//!
//! # Responsibilities
//! - Visit every node of a failure's cause chain, outermost first
//! - Record the first node, the first non-platform node and the marked node
//! - Collect one `"<Type>: <message>"` summary per node
//!
//! # Design Decisions
//! - Only an explicit resolver answer marks a node; the default never does
//! - Traversal is iterative and bounded by depth and by revisited identities

use std::sync::Arc;

use axum::http::StatusCode;

use crate::fault::kind::{FaultKind, FaultRef, PLATFORM_PREFIXES};
use crate::fault::resolver::StatusResolver;

/// Default bound on the number of visited nodes.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// One captured entry of a cause chain.
#[derive(Debug, Clone)]
pub struct FaultNode<'a> {
    fault: FaultRef<'a>,
    kind: FaultKind,
    message: Option<String>,
    depth: usize,
}

impl<'a> FaultNode<'a> {
    pub fn capture(fault: FaultRef<'a>, depth: usize) -> Self {
        Self {
            kind: fault.kind(),
            message: fault.message(),
            fault,
            depth,
        }
    }

    pub fn fault(&self) -> FaultRef<'a> {
        self.fault
    }

    pub fn kind(&self) -> &FaultKind {
        &self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// `"<simple-type-name>: <message>"`, or the bare name without a message.
    pub fn summary(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {}", self.kind.simple_name(), message),
            None => self.kind.simple_name().to_string(),
        }
    }
}

/// Accumulated result of one walk.
#[derive(Debug, Clone, Default)]
pub struct FaultInfo<'a> {
    /// Outermost node.
    pub first: Option<FaultNode<'a>>,
    /// First node outside the platform namespace.
    pub first_non_platform: Option<FaultNode<'a>>,
    /// Node whose type first produced an explicit status.
    pub marked: Option<FaultNode<'a>>,
    pub status: Option<StatusCode>,
    /// Per-node summaries in traversal order.
    pub messages: Vec<String>,
    /// Set when the walk stopped on the depth or cycle guard.
    pub truncated: bool,
}

impl<'a> FaultInfo<'a> {
    /// Marked node, else first non-platform node, else first node.
    pub fn representative(&self) -> Option<&FaultNode<'a>> {
        self.marked
            .as_ref()
            .or(self.first_non_platform.as_ref())
            .or(self.first.as_ref())
    }

    /// Resolved status, or 500.
    pub fn status_or_default(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Walks cause chains and resolves statuses along the way.
#[derive(Debug, Clone)]
pub struct FaultChainWalker {
    resolver: Arc<StatusResolver>,
    platform_prefixes: Vec<String>,
    max_depth: usize,
}

impl FaultChainWalker {
    pub fn new(resolver: Arc<StatusResolver>) -> Self {
        Self {
            resolver,
            platform_prefixes: PLATFORM_PREFIXES.iter().map(|p| p.to_string()).collect(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_platform_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.platform_prefixes = prefixes;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn resolver(&self) -> &Arc<StatusResolver> {
        &self.resolver
    }

    pub fn walk<'a>(&self, root: FaultRef<'a>) -> FaultInfo<'a> {
        let mut info = FaultInfo::default();
        let mut visited: Vec<FaultRef<'a>> = Vec::new();
        let mut current = Some(root);
        let mut depth = 0;

        while let Some(fault) = current {
            if depth >= self.max_depth || visited.iter().any(|seen| seen.same_object(&fault)) {
                tracing::debug!(depth, "Cause chain truncated");
                info.truncated = true;
                break;
            }

            visited.push(fault);
            let node = FaultNode::capture(fault, depth);

            if info.first.is_none() {
                info.first = Some(node.clone());
            }
            if info.first_non_platform.is_none() && !node.kind().is_within(&self.platform_prefixes) {
                info.first_non_platform = Some(node.clone());
            }
            info.messages.push(node.summary());

            if info.status.is_none() {
                if let Some(status) = self.resolver.lookup(node.kind()) {
                    info.status = Some(status);
                    info.marked = Some(node);
                }
            }

            current = fault.next();
            depth += 1;
        }

        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::kind::Fault;
    use std::fmt;

    #[derive(Debug)]
    struct Node {
        kind: FaultKind,
        message: Option<&'static str>,
        cause: Option<Box<Node>>,
    }

    impl fmt::Display for Node {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message.unwrap_or(""))
        }
    }

    impl Fault for Node {
        fn kind(&self) -> FaultKind {
            self.kind
        }
        fn cause(&self) -> Option<FaultRef<'_>> {
            self.cause.as_deref().map(|c| FaultRef::Fault(c))
        }
    }

    struct K0;
    struct K1;
    struct K2;
    struct K3;

    fn chain(kinds: &[FaultKind]) -> Node {
        let mut next: Option<Box<Node>> = None;
        for (i, kind) in kinds.iter().enumerate().rev() {
            next = Some(Box::new(Node {
                kind: *kind,
                message: if i % 2 == 0 { Some("failed") } else { None },
                cause: next,
            }));
        }
        *next.unwrap()
    }

    #[test]
    fn test_messages_one_per_node_in_order() {
        let walker = FaultChainWalker::new(Arc::new(StatusResolver::new()));
        let root = chain(&[FaultKind::of::<K0>(), FaultKind::of::<K1>(), FaultKind::of::<K2>()]);
        let info = walker.walk(FaultRef::Fault(&root));
        assert_eq!(info.messages, vec!["K0: failed", "K1", "K2: failed"]);
        assert!(info.status.is_none());
        assert!(!info.truncated);
        assert_eq!(info.representative().unwrap().kind(), &FaultKind::of::<K0>());
    }

    #[test]
    fn test_marks_first_node_with_explicit_status() {
        let resolver = Arc::new(StatusResolver::new());
        resolver.register(FaultKind::of::<K2>(), StatusCode::CONFLICT);
        resolver.register(FaultKind::of::<K3>(), StatusCode::GONE);
        let walker = FaultChainWalker::new(resolver);

        let root = chain(&[
            FaultKind::of::<K0>(),
            FaultKind::of::<K1>(),
            FaultKind::of::<K2>(),
            FaultKind::of::<K3>(),
            FaultKind::of::<K0>(),
        ]);
        let info = walker.walk(FaultRef::Fault(&root));
        let marked = info.marked.as_ref().unwrap();
        assert_eq!(marked.depth(), 2);
        assert_eq!(marked.kind(), &FaultKind::of::<K2>());
        assert_eq!(info.status, Some(StatusCode::CONFLICT));
        assert_eq!(info.messages.len(), 5);
    }

    #[test]
    fn test_platform_nodes_are_skipped_for_representative() {
        let walker = FaultChainWalker::new(Arc::new(StatusResolver::new()));
        let root = chain(&[FaultKind::of::<std::io::Error>(), FaultKind::of::<K1>()]);
        let info = walker.walk(FaultRef::Fault(&root));
        assert_eq!(info.first.as_ref().unwrap().depth(), 0);
        assert_eq!(info.first_non_platform.as_ref().unwrap().depth(), 1);
        assert_eq!(info.representative().unwrap().depth(), 1);
    }

    #[test]
    fn test_foreign_sources_are_followed() {
        #[derive(Debug)]
        struct Wrapper(std::io::Error);
        impl fmt::Display for Wrapper {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("wrapped")
            }
        }
        impl Fault for Wrapper {
            fn kind(&self) -> FaultKind {
                FaultKind::of::<Self>()
            }
            fn cause(&self) -> Option<FaultRef<'_>> {
                Some(FaultRef::Foreign(&self.0))
            }
        }

        let walker = FaultChainWalker::new(Arc::new(StatusResolver::new()));
        let err = Wrapper(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let info = walker.walk(FaultRef::Fault(&err));
        assert_eq!(info.messages, vec!["Wrapper: wrapped", "Error: disk full"]);
    }

    #[test]
    fn test_newtype_wrapper_and_its_field_are_distinct_nodes() {
        #[derive(Debug)]
        struct DiskFull;
        impl fmt::Display for DiskFull {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("disk full")
            }
        }
        impl std::error::Error for DiskFull {}

        // Same data address as its field
        #[derive(Debug)]
        struct SaveFailed(DiskFull);
        impl fmt::Display for SaveFailed {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("save failed")
            }
        }
        impl std::error::Error for SaveFailed {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let walker = FaultChainWalker::new(Arc::new(StatusResolver::new()));
        let err = SaveFailed(DiskFull);
        let info = walker.walk(FaultRef::Foreign(&err));
        assert_eq!(info.messages, vec!["Error: save failed", "Error: disk full"]);
        assert!(!info.truncated);
    }

    #[test]
    fn test_newtype_fault_wrapper_keeps_inner_status() {
        #[derive(Debug)]
        struct Inner;
        impl fmt::Display for Inner {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("inner")
            }
        }
        impl Fault for Inner {
            fn kind(&self) -> FaultKind {
                FaultKind::of::<Self>().declares(StatusCode::NOT_FOUND)
            }
        }

        #[derive(Debug)]
        struct Outer(Inner);
        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("outer")
            }
        }
        impl Fault for Outer {
            fn kind(&self) -> FaultKind {
                FaultKind::of::<Self>()
            }
            fn cause(&self) -> Option<FaultRef<'_>> {
                Some(FaultRef::Fault(&self.0))
            }
        }

        let walker = FaultChainWalker::new(Arc::new(StatusResolver::new()));
        let err = Outer(Inner);
        let info = walker.walk(FaultRef::Fault(&err));
        assert_eq!(info.messages.len(), 2);
        assert_eq!(info.status, Some(StatusCode::NOT_FOUND));
        assert_eq!(info.marked.as_ref().map(|n| n.depth()), Some(1));
    }

    #[derive(Debug)]
    struct Looping;

    impl fmt::Display for Looping {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("again")
        }
    }

    impl Fault for Looping {
        fn kind(&self) -> FaultKind {
            FaultKind::of::<Self>()
        }
        fn cause(&self) -> Option<FaultRef<'_>> {
            Some(FaultRef::Fault(self))
        }
    }

    #[test]
    fn test_self_referencing_cause_terminates() {
        let walker = FaultChainWalker::new(Arc::new(StatusResolver::new()));
        let looping = Looping;
        let info = walker.walk(FaultRef::Fault(&looping));
        assert!(info.truncated);
        assert_eq!(info.messages.len(), 1);
    }

    #[test]
    fn test_depth_guard() {
        let walker = FaultChainWalker::new(Arc::new(StatusResolver::new())).with_max_depth(2);
        let root = chain(&[FaultKind::of::<K0>(), FaultKind::of::<K1>(), FaultKind::of::<K2>()]);
        let info = walker.walk(FaultRef::Fault(&root));
        assert!(info.truncated);
        assert_eq!(info.messages.len(), 2);
    }
}
