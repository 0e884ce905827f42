//! Purpose: Resource bounds applied to every request body parse.
//! Exports: `ResourceLimits`.
//! Role: Caps worst-case memory and CPU per request regardless of input shape.
//! Invariants: All three limits are enforced before the state they guard is mutated.

/// Upper bounds for one parse.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResourceLimits {
    /// Bytes readable from the body stream; one more byte fails with `TooLarge`.
    pub max_body_bytes: u64,
    /// Entries any single mapping or sequence may hold.
    pub max_container_entries: usize,
    /// Open containers at once, root included.
    pub max_depth: usize,
}

impl ResourceLimits {
    pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;
    pub const DEFAULT_MAX_CONTAINER_ENTRIES: usize = 1000;
    pub const DEFAULT_MAX_DEPTH: usize = 32;

    pub const fn new(max_body_bytes: u64, max_container_entries: usize, max_depth: usize) -> Self {
        Self {
            max_body_bytes,
            max_container_entries,
            max_depth,
        }
    }

    /// Tight limits for small headers and embedded documents.
    pub const fn strict() -> Self {
        Self::new(16 * 1024, 100, 8)
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_MAX_BODY_BYTES,
            Self::DEFAULT_MAX_CONTAINER_ENTRIES,
            Self::DEFAULT_MAX_DEPTH,
        )
    }
}
