use std::{cell::Cell, rc::Rc};

///
/// LazyLoader
///
/// Reentrant suspension of lazy reference loading. Each `suspend` returns a
/// guard; loading is enabled again once every guard has been dropped.
///

#[derive(Clone, Debug, Default)]
pub struct LazyLoader {
    suspended: Rc<Cell<usize>>,
}

impl LazyLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.suspended.get() == 0
    }

    #[must_use]
    pub fn suspend(&self) -> SuspendGuard {
        self.suspended.set(self.suspended.get() + 1);

        SuspendGuard {
            suspended: Rc::clone(&self.suspended),
        }
    }
}

///
/// SuspendGuard
///

#[derive(Debug)]
pub struct SuspendGuard {
    suspended: Rc<Cell<usize>>,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.suspended.set(self.suspended.get().saturating_sub(1));
    }
}
