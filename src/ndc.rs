//! Nested diagnostic context.
//!
//! A per-thread, stack-like store of contextual annotations consumed by
//! logging calls. Each OS thread sees its own independent stack. The thread
//! trampoline calls [`remove`] once right before the thread exits so the
//! store never outlives its thread.

use std::cell::RefCell;

thread_local! {
    static STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Push an annotation onto the current thread's context stack.
pub fn push(message: impl Into<String>) {
    STACK.with(|stack| stack.borrow_mut().push(message.into()));
}

/// Pop the most recent annotation, if any.
pub fn pop() -> Option<String> {
    STACK.with(|stack| stack.borrow_mut().pop())
}

/// Most recent annotation without removing it.
pub fn peek() -> Option<String> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Number of annotations on the current thread's stack.
pub fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}

/// Full context rendered oldest-first, space separated.
pub fn get() -> String {
    STACK.with(|stack| stack.borrow().join(" "))
}

/// Clear the current thread's stack entirely.
pub fn remove() {
    STACK.with(|stack| stack.borrow_mut().clear());
}
