//! Per-page lock registry
//!
//! Each page has at most one holder and a FIFO of work waiting for it. The
//! holder drains that FIFO in arrival order and frees the page once it is
//! empty, so waiting work never sits on a render thread and different pages
//! only share the brief map lookup.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct PageSlot<T> {
    held: bool,
    waiting: VecDeque<T>,
}

impl<T> Default for PageSlot<T> {
    fn default() -> Self {
        Self {
            held: false,
            waiting: VecDeque::new(),
        }
    }
}

/// Lazily populated map from page number to its holder state and backlog
#[derive(Debug)]
pub struct PageLocks<T> {
    pages: Mutex<HashMap<usize, PageSlot<T>>>,
}

impl<T> Default for PageLocks<T> {
    fn default() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> PageLocks<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn pages(&self) -> MutexGuard<'_, HashMap<usize, PageSlot<T>>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer `item` for `page`.
    ///
    /// Returns the item back when the page was free: the caller now holds the
    /// page and must [`release`](Self::release) it. Otherwise the item joins
    /// the page's backlog and the current holder will hand it out.
    #[must_use]
    pub fn acquire(&self, page: usize, item: T) -> Option<T> {
        let mut pages = self.pages();
        let slot = pages.entry(page).or_default();
        if slot.held {
            slot.waiting.push_back(item);
            None
        } else {
            slot.held = true;
            Some(item)
        }
    }

    /// Finish one item on a held page.
    ///
    /// Returns the oldest waiting item, keeping the page held, or frees the
    /// page and returns `None` when nothing is waiting.
    #[must_use]
    pub fn release(&self, page: usize) -> Option<T> {
        let mut pages = self.pages();
        let slot = pages.entry(page).or_default();
        let next = slot.waiting.pop_front();
        if next.is_none() {
            slot.held = false;
        }
        next
    }

    /// Run `f` on `item` and then on everything queued behind it, unless the
    /// page is already held, in which case `item` waits for that holder.
    pub fn drain(&self, page: usize, item: T, mut f: impl FnMut(T)) {
        let mut next = self.acquire(page, item);
        while let Some(item) = next {
            f(item);
            next = self.release(page);
        }
    }

    /// Items waiting behind the holder of `page`
    #[must_use]
    pub fn waiting(&self, page: usize) -> usize {
        self.pages().get(&page).map_or(0, |slot| slot.waiting.len())
    }

    /// Whether some caller currently holds `page`
    #[must_use]
    pub fn is_held(&self, page: usize) -> bool {
        self.pages().get(&page).is_some_and(|slot| slot.held)
    }

    /// Number of pages that have been locked at least once
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
