//! Build Context
//!
//! Tracks which graph builds are running on the current thread, so that
//! misuse (tagging from inside a build) can be caught in debug builds.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per active build. Entering a build
//! pushes the graph's name; the returned guard pops it when dropped, also
//! when the build panics.

use std::cell::RefCell;

thread_local! {
    static BUILD_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Guard of an active build.
pub struct BuildContext {
    label: String,
}

impl BuildContext {
    /// Enter a build. The build ends when the guard is dropped.
    pub fn enter(label: impl Into<String>) -> Self {
        let label = label.into();
        BUILD_STACK.with(|stack| stack.borrow_mut().push(label.clone()));
        Self { label }
    }

    /// Whether a build is running on this thread.
    pub fn is_active() -> bool {
        BUILD_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Label of the innermost active build.
    pub fn current() -> Option<String> {
        BUILD_STACK.with(|stack| stack.borrow().last().cloned())
    }
}

impl Drop for BuildContext {
    fn drop(&mut self) {
        BUILD_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(label) = popped {
                debug_assert_eq!(label, self.label, "BuildContext mismatch");
            }
        });
    }
}
