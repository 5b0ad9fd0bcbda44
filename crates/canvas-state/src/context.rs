#![forbid(unsafe_code)]

//! Producer/consumer pairs for handing values down a call tree.
//!
//! [`create_context`] returns a [`Producer`] and a [`Consumer`] sharing one
//! context id. While a [`ProvideGuard`] from the producer is alive, every
//! read through the consumer on the same thread resolves to the most
//! recently provided value; with no active producer the consumer falls back
//! to the context default.
//!
//! # Invariants
//!
//! 1. Frames of different contexts never shadow each other.
//! 2. Nested frames of the same context shadow outer ones until dropped.
//! 3. Dropping a guard removes exactly its own frame, even out of order.
//!
//! Frames live in a thread-local stack, so producers and consumers are
//! `!Send` by construction.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::id::{ContextId, FrameId};

struct Frame {
    context: ContextId,
    frame: FrameId,
    value: Rc<dyn Any>,
}

thread_local! {
    static PROVIDERS: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

struct ContextInner<T> {
    id: ContextId,
    default: T,
}

/// Create a linked producer/consumer pair with a fallback value.
pub fn create_context<T: Clone + 'static>(default: T) -> (Producer<T>, Consumer<T>) {
    let inner = Rc::new(ContextInner {
        id: ContextId::next(),
        default,
    });
    (
        Producer {
            inner: Rc::clone(&inner),
        },
        Consumer { inner },
    )
}

/// Supplies values to the paired [`Consumer`].
pub struct Producer<T> {
    inner: Rc<ContextInner<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("context", &self.inner.id)
            .finish()
    }
}

impl<T: Clone + 'static> Producer<T> {
    /// Context shared with the paired consumer.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.inner.id
    }

    /// Push `value` as the nearest provided value until the guard drops.
    #[must_use = "the value is only provided while the guard is alive"]
    pub fn provide(&self, value: T) -> ProvideGuard {
        let frame = FrameId::next();
        PROVIDERS.with_borrow_mut(|stack| {
            stack.push(Frame {
                context: self.inner.id,
                frame,
                value: Rc::new(value),
            });
        });
        ProvideGuard {
            frame,
            _not_send: PhantomData,
        }
    }

    /// Run `f` with `value` provided.
    pub fn scope<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        let _guard = self.provide(value);
        f()
    }
}

/// Reads the value supplied by the nearest active [`Producer`] frame.
pub struct Consumer<T> {
    inner: Rc<ContextInner<T>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("context", &self.inner.id)
            .finish()
    }
}

impl<T: Clone + 'static> Consumer<T> {
    /// Context shared with the paired producer.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.inner.id
    }

    fn nearest(&self) -> Option<Rc<T>> {
        let value = PROVIDERS.with_borrow(|stack| {
            stack
                .iter()
                .rev()
                .find(|frame| frame.context == self.inner.id)
                .map(|frame| Rc::clone(&frame.value))
        })?;
        value.downcast::<T>().ok()
    }

    /// Access the nearest provided value, or the default.
    ///
    /// No provider state is borrowed while `f` runs, so `f` may provide or
    /// read further values.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.nearest() {
            Some(value) => f(&value),
            None => f(&self.inner.default),
        }
    }

    /// Clone of the nearest provided value, or the default.
    #[must_use]
    pub fn read(&self) -> T {
        self.with(T::clone)
    }

    /// Whether a producer frame for this context is active.
    #[must_use]
    pub fn is_provided(&self) -> bool {
        PROVIDERS.with_borrow(|stack| stack.iter().any(|frame| frame.context == self.inner.id))
    }
}

/// Keeps one provided frame alive.
pub struct ProvideGuard {
    frame: FrameId,
    _not_send: PhantomData<Rc<()>>,
}

impl fmt::Debug for ProvideGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvideGuard")
            .field("frame", &self.frame)
            .finish()
    }
}

impl Drop for ProvideGuard {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = PROVIDERS.try_with(|stack| {
            let Ok(mut stack) = stack.try_borrow_mut() else {
                return;
            };
            if let Some(index) = stack.iter().rposition(|f| f.frame == self.frame) {
                stack.remove(index);
            }
        });
    }
}
