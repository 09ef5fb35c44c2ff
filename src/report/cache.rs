use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheState {
    Empty,
    Filled,
}

/// A derived statistic that is computed once and then never recomputed.
///
/// The slot moves from [`CacheState::Empty`] to [`CacheState::Filled`] at most
/// once. A failed computation leaves it `Empty`.
#[derive(Debug)]
pub(crate) struct StatCache<T> {
    cell: OnceLock<T>,
}

impl<T> Default for StatCache<T> {
    fn default() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }
}

impl<T> StatCache<T> {
    pub(crate) fn state(&self) -> CacheState {
        match self.cell.get() {
            Some(_) => CacheState::Filled,
            None => CacheState::Empty,
        }
    }

    /// Returns the cached value, computing it with `fill` if the slot is empty.
    ///
    /// If two callers race on an empty slot both compute, but only the first
    /// stored value is ever observed.
    pub(crate) fn get_or_try_fill<E>(&self, fill: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let value = fill()?;
        Ok(self.cell.get_or_init(|| value))
    }
}
