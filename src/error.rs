use thiserror::Error;

/// RbError enumerates over all possible errors that this package
/// shall return.
#[derive(Debug, Error, PartialEq)]
pub enum RbError<K> {
    /// Returned by insert() API when key is already present.
    #[error("key already present")]
    OverwriteKey,
    /// Returned by insert() API when the node arena cannot grow.
    #[error("out of memory allocating tree node")]
    OutOfMemory,
    /// Fatal case, a red node has a red child.
    #[error("consecutive red nodes")]
    ConsecutiveReds,
    /// Fatal case, root node is colored red.
    #[error("root node is red")]
    RedRoot,
    /// Fatal case, black count differs between two paths. The String
    /// component of this variant can be used for debugging.
    #[error("unbalanced blacks, {0}")]
    UnbalancedBlacks(String),
    /// Fatal case, index entries are not in sort-order. Carries the
    /// offending key and the bounding key it violates.
    #[error("entries are not in sort order")]
    SortError(K, K),
    /// Fatal case, a child does not point back to its parent.
    #[error("broken parent link, {0}")]
    BrokenLink(String),
    /// Fatal case, reachable nodes disagree with the entry count.
    #[error("entry count mismatch, expected {expected} found {found}")]
    EntryCount { expected: usize, found: usize },
    /// Fatal case, tree is deeper than 2*log2(n+1).
    #[error("depth {depth} exceeds bound {bound} for {entries} entries")]
    DepthExceeded {
        depth: usize,
        bound: usize,
        entries: usize,
    },
}
