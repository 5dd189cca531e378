use std::{
    marker::PhantomData,
    sync::atomic::{AtomicUsize, Ordering},
};

/// A type that can be built from a dense `usize` index.
pub trait Idx: Copy {
    fn new(idx: usize) -> Self;
    fn index(self) -> usize;
}

/// Declares a `u32`-backed index newtype implementing [`Idx`].
#[macro_export]
macro_rules! newtype_index {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        $vis struct $name(u32);

        impl $crate::index::Idx for $name {
            fn new(idx: usize) -> Self {
                $name(u32::try_from(idx).unwrap_or_else(|_| $crate::bug!("index overflow")))
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $name {
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }
    };
}

/// Mints fresh, monotonically increasing indices.
pub struct IndexGen<I> {
    count: AtomicUsize,
    _marker: PhantomData<I>,
}

impl<I: Idx> IndexGen<I> {
    pub fn new() -> Self {
        IndexGen { count: AtomicUsize::new(0), _marker: PhantomData }
    }

    pub fn fresh(&self) -> I {
        let index = self.count.fetch_add(1, Ordering::Relaxed);
        I::new(index)
    }
}

impl<I: Idx> Default for IndexGen<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// A vector indexed by a typed index.
#[derive(Clone, Debug)]
pub struct IndexVec<I, T> {
    raw: Vec<T>,
    _marker: PhantomData<I>,
}

impl<I: Idx, T> IndexVec<I, T> {
    pub fn new() -> Self {
        IndexVec { raw: Vec::new(), _marker: PhantomData }
    }

    pub fn push(&mut self, value: T) -> I {
        let idx = I::new(self.raw.len());
        self.raw.push(value);
        idx
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> {
        self.raw.iter().enumerate().map(|(i, v)| (I::new(i), v))
    }
}

impl<I: Idx, T> Default for IndexVec<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Idx, T> std::ops::Index<I> for IndexVec<I, T> {
    type Output = T;

    fn index(&self, idx: I) -> &T {
        &self.raw[idx.index()]
    }
}

impl<I: Idx, T> std::ops::IndexMut<I> for IndexVec<I, T> {
    fn index_mut(&mut self, idx: I) -> &mut T {
        &mut self.raw[idx.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::newtype_index! {
        struct TestIdx;
    }

    #[test]
    fn generator_is_monotonic() {
        let idx_gen = IndexGen::<TestIdx>::new();
        assert_eq!(idx_gen.fresh().index(), 0);
        assert_eq!(idx_gen.fresh().index(), 1);
        assert_eq!(idx_gen.fresh().index(), 2);
    }

    #[test]
    fn index_vec_push_returns_position() {
        let mut v = IndexVec::<TestIdx, &str>::new();
        let a = v.push("a");
        let b = v.push("b");
        assert_eq!(v[a], "a");
        assert_eq!(v[b], "b");
        assert_eq!(v.iter_enumerated().map(|(i, _)| i.index()).collect::<Vec<_>>(), vec![0, 1]);
    }
}
