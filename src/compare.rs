use std::cmp::Ordering;

/// Comparator is the ordering strategy an [`Rbtree`] instance applies to
/// its keys. Implementations must be a total order, otherwise the shape
/// of the tree is undefined.
///
/// [`Rbtree`]: crate::Rbtree
pub trait Comparator<K: ?Sized> {
    /// Three way comparison of `a` against `b`.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Natural ordering, as defined by the key's [`Ord`] implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Natural;

impl<K> Comparator<K> for Natural
where
    K: Ord + ?Sized,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Byte-wise lexicographic ordering for variable length keys, like
/// `String`, `&str`, `Vec<u8>` and `&[u8]`. Keys are compared on their
/// content, never on identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lexical;

impl<K> Comparator<K> for Lexical
where
    K: AsRef<[u8]> + ?Sized,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.as_ref().cmp(b.as_ref())
    }
}

impl<'a, K, C> Comparator<K> for &'a C
where
    K: ?Sized,
    C: Comparator<K> + ?Sized,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        (**self).compare(a, b)
    }
}
