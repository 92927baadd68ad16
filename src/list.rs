//! Intrusive doubly-linked circular list with a sentinel head.
//!
//! Every scheduled entity lives at a fixed `'static` address (the process
//! table is a fixed array), so list membership is tracked with raw
//! pointers embedded directly in the entry rather than through an
//! allocator-backed container, one list node per process, reused across
//! whichever structure currently owns it (free list, an MLFQ level, the
//! stride run-list, or the sleep list), exactly as `Process::sched_links`
//! is reused in `proc::process`. A second, independent link field
//! (`Process::sibling_links`) threads the separate parent/children
//! relationship, since a process can be on the sleep list *and* on its
//! parent's children list at once.
//!
//! An [`Adapter`] tells a [`List`] how to get from an entry pointer to its
//! embedded [`Links`] and back (the "container-of" recovery), the same
//! role `intrusive_adapter!` plays in the `intrusive-collections` crate.
//! All operations below are O(1) except [`List::iter`] and
//! [`List::append_all`] (append is O(1) by pointer surgery; it merely
//! *looks* linear because it also walks the moved nodes to report how
//! many moved).

use core::marker::PhantomData;
use core::ptr::{addr_of_mut, null_mut};

/// Computes the byte offset of `$field` within `$ty` without requiring a
/// live value of `$ty` (and without dereferencing a null pointer).
#[macro_export]
macro_rules! field_offset {
    ($ty:ty, $field:ident) => {{
        let uninit = core::mem::MaybeUninit::<$ty>::uninit();
        let base = uninit.as_ptr();
        (core::ptr::addr_of!((*base).$field) as usize) - (base as usize)
    }};
}

/// Recovers a `*mut $ty` from a `*mut Links` known to be `$ty`'s `$field`.
#[macro_export]
macro_rules! container_of {
    ($links:expr, $ty:ty, $field:ident) => {{
        let offset = $crate::field_offset!($ty, $field);
        ($links as usize - offset) as *mut $ty
    }};
}

/// An intrusive link embedded in a list entry.
pub struct Links {
    pub(crate) prev: *mut Links,
    pub(crate) next: *mut Links,
}
impl Links {
    pub const fn new() -> Links {
        Links {
            prev: null_mut(),
            next: null_mut(),
        }
    }
    /// A node is linked (in some list, sentinel or not) once it has been
    /// through [`List::init_sentinel`] or inserted with [`List::push_back`]
    /// etc. A freshly-constructed, never-linked node has null pointers.
    pub fn is_linked(&self) -> bool {
        !self.next.is_null()
    }
}
impl Default for Links {
    fn default() -> Links {
        Links::new()
    }
}

/// Maps between an entry pointer and its embedded [`Links`] for one
/// particular field of one particular type. Implementations are trivial
/// and unsafe only because they promise the field really is embedded in
/// the entry at a stable address (true for every `'static` process slot).
///
/// # Safety
/// `links_of` and `entry_of` must be exact inverses of each other for any
/// pointer actually produced by the other, and the `Links` they name must
/// never move for the lifetime of the entry.
pub unsafe trait Adapter {
    type Entry;
    unsafe fn links_of(entry: *mut Self::Entry) -> *mut Links;
    unsafe fn entry_of(links: *mut Links) -> *mut Self::Entry;
}

/// A circular doubly-linked list of `A::Entry`, addressed through `A`.
pub struct List<A: Adapter> {
    sentinel: Links,
    _adapter: PhantomData<A>,
}
impl<A: Adapter> List<A> {
    /// Builds a list whose sentinel is *not yet* circularly linked. Call
    /// [`List::init`] once the list has reached its final address (e.g.
    /// inside a `'static`) before using it.
    pub const fn new() -> List<A> {
        List {
            sentinel: Links::new(),
            _adapter: PhantomData,
        }
    }

    pub(crate) fn sentinel_ptr(&mut self) -> *mut Links {
        addr_of_mut!(self.sentinel)
    }

    /// Must be called exactly once, after `self` has its final address,
    /// before any other operation. Matches `ProcTable::init()` wiring up
    /// every list it owns.
    pub fn init(&mut self) {
        let s = self.sentinel_ptr();
        unsafe {
            (*s).prev = s;
            (*s).next = s;
        }
    }

    pub fn is_empty(&mut self) -> bool {
        let s = self.sentinel_ptr();
        unsafe { (*s).next == s }
    }

    /// Insert `entry` as the new head (front) of the list.
    pub fn push_front(&mut self, entry: *mut A::Entry) {
        unsafe {
            let node = A::links_of(entry);
            let s = self.sentinel_ptr();
            Self::link_between(s, node, (*s).next);
        }
    }

    /// Insert `entry` as the new tail (back) of the list.
    pub fn push_back(&mut self, entry: *mut A::Entry) {
        unsafe {
            let node = A::links_of(entry);
            let s = self.sentinel_ptr();
            Self::link_between((*s).prev, node, s);
        }
    }

    /// Remove `entry` from whatever list it is currently linked into.
    /// No-op if it is not linked. Returns whether it was removed.
    ///
    /// # Safety
    /// `entry` must currently be linked into *this* list (or unlinked).
    pub unsafe fn remove(entry: *mut A::Entry) -> bool {
        let node = A::links_of(entry);
        if !(*node).is_linked() {
            return false;
        }
        let prev = (*node).prev;
        let next = (*node).next;
        (*prev).next = next;
        (*next).prev = prev;
        (*node).prev = null_mut();
        (*node).next = null_mut();
        true
    }

    pub fn pop_front(&mut self) -> Option<*mut A::Entry> {
        if self.is_empty() {
            return None;
        }
        unsafe {
            let s = self.sentinel_ptr();
            let node = (*s).next;
            let entry = A::entry_of(node);
            Self::remove(entry);
            Some(entry)
        }
    }

    /// Move every node of `self` onto the tail of `dst`, leaving `self`
    /// empty. `src_pin`/`dst_pin` are the rotation-pin cursors (see
    /// [`crate::proc::mlfq`]) belonging to `self` and `dst` respectively:
    /// if `dst` was empty and its pin did not already equal `self`'s
    /// sentinel, the destination adopts `src_pin` so the cursor keeps
    /// pointing at the same (now relocated) node; `self`'s own pin always
    /// resets to its own (now-empty) sentinel. Returns the updated
    /// `(dst_pin, src_pin)` pair for the caller to store back.
    pub fn append_all_with_pin(
        &mut self,
        dst: &mut List<A>,
        src_pin: *mut Links,
        dst_pin: *mut Links,
    ) -> (*mut Links, *mut Links) {
        let src_sentinel = self.sentinel_ptr();
        let dst_sentinel = dst.sentinel_ptr();
        let was_dst_empty = dst.is_empty();

        if !self.is_empty() {
            unsafe {
                let first = (*src_sentinel).next;
                let last = (*src_sentinel).prev;
                let dst_last = (*dst_sentinel).prev;

                (*dst_last).next = first;
                (*first).prev = dst_last;
                (*last).next = dst_sentinel;
                (*dst_sentinel).prev = last;

                (*src_sentinel).next = src_sentinel;
                (*src_sentinel).prev = src_sentinel;
            }
        }

        let new_dst_pin = if was_dst_empty && dst_pin != src_sentinel {
            src_pin
        } else {
            dst_pin
        };
        let new_src_pin = src_sentinel;
        (new_dst_pin, new_src_pin)
    }

    /// Iterate the list front-to-back without mutating it.
    pub fn iter(&self) -> ListIter<A> {
        ListIter {
            sentinel: &self.sentinel as *const Links as *mut Links,
            cursor: self.sentinel.next,
            started: false,
            _adapter: PhantomData,
        }
    }

    fn link_between(prev: *mut Links, node: *mut Links, next: *mut Links) {
        unsafe {
            (*node).prev = prev;
            (*node).next = next;
            (*prev).next = node;
            (*next).prev = node;
        }
    }
}
impl<A: Adapter> Default for List<A> {
    fn default() -> Self {
        List::new()
    }
}

pub struct ListIter<A: Adapter> {
    sentinel: *mut Links,
    cursor: *mut Links,
    started: bool,
    _adapter: PhantomData<A>,
}
impl<A: Adapter> Iterator for ListIter<A> {
    type Item = *mut A::Entry;
    fn next(&mut self) -> Option<*mut A::Entry> {
        if self.sentinel.is_null() {
            return None;
        }
        if self.started && self.cursor == self.sentinel {
            return None;
        }
        self.started = true;
        if self.cursor == self.sentinel || self.cursor.is_null() {
            return None;
        }
        let entry = unsafe { A::entry_of(self.cursor) };
        self.cursor = unsafe { (*self.cursor).next };
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    struct Item {
        id: i32,
        links: Links,
    }
    impl Item {
        fn leak(id: i32) -> *mut Item {
            Box::leak(Box::new(Item {
                id,
                links: Links::new(),
            }))
        }
    }
    struct ItemAdapter;
    unsafe impl Adapter for ItemAdapter {
        type Entry = Item;
        unsafe fn links_of(entry: *mut Item) -> *mut Links {
            addr_of_mut!((*entry).links)
        }
        unsafe fn entry_of(links: *mut Links) -> *mut Item {
            container_of!(links, Item, links)
        }
    }

    fn ids(list: &List<ItemAdapter>) -> std::vec::Vec<i32> {
        list.iter().map(|p| unsafe { (*p).id }).collect()
    }

    #[test]
    fn push_back_preserves_order() {
        let mut list = List::<ItemAdapter>::new();
        list.init();
        assert!(list.is_empty());
        list.push_back(Item::leak(1));
        list.push_back(Item::leak(2));
        list.push_back(Item::leak(3));
        assert!(!list.is_empty());
        assert_eq!(ids(&list), std::vec![1, 2, 3]);
    }

    #[test]
    fn push_front_preserves_order() {
        let mut list = List::<ItemAdapter>::new();
        list.init();
        list.push_front(Item::leak(1));
        list.push_front(Item::leak(2));
        list.push_front(Item::leak(3));
        assert_eq!(ids(&list), std::vec![3, 2, 1]);
    }

    #[test]
    fn remove_middle_relinks_neighbors() {
        let mut list = List::<ItemAdapter>::new();
        list.init();
        let a = Item::leak(1);
        let b = Item::leak(2);
        let c = Item::leak(3);
        list.push_back(a);
        list.push_back(b);
        list.push_back(c);
        assert!(unsafe { List::<ItemAdapter>::remove(b) });
        assert_eq!(ids(&list), std::vec![1, 3]);
        unsafe {
            assert!(!(*ItemAdapter::links_of(b)).is_linked());
        }
    }

    #[test]
    fn remove_is_a_noop_on_an_unlinked_entry() {
        let a = Item::leak(1);
        assert!(!unsafe { List::<ItemAdapter>::remove(a) });
    }

    #[test]
    fn pop_front_drains_in_order() {
        let mut list = List::<ItemAdapter>::new();
        list.init();
        list.push_back(Item::leak(1));
        list.push_back(Item::leak(2));
        assert_eq!(unsafe { (*list.pop_front().unwrap()).id }, 1);
        assert_eq!(unsafe { (*list.pop_front().unwrap()).id }, 2);
        assert!(list.pop_front().is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn append_all_with_pin_splices_and_empties_source() {
        let mut src = List::<ItemAdapter>::new();
        src.init();
        let mut dst = List::<ItemAdapter>::new();
        dst.init();
        src.push_back(Item::leak(1));
        src.push_back(Item::leak(2));
        dst.push_back(Item::leak(3));

        let src_pin = src.sentinel_ptr();
        let dst_pin = dst.sentinel_ptr();
        let (new_dst_pin, new_src_pin) = src.append_all_with_pin(&mut dst, src_pin, dst_pin);

        assert!(src.is_empty());
        assert_eq!(ids(&dst), std::vec![3, 1, 2]);
        assert_eq!(new_src_pin, src.sentinel_ptr());
        assert_eq!(new_dst_pin, dst_pin);
    }

    #[test]
    fn append_all_with_pin_adopts_source_pin_into_an_empty_destination() {
        let mut src = List::<ItemAdapter>::new();
        src.init();
        let mut dst = List::<ItemAdapter>::new();
        dst.init();
        let a = Item::leak(1);
        src.push_back(a);
        let src_pin = unsafe { ItemAdapter::links_of(a) };
        let dst_pin = dst.sentinel_ptr();

        let (new_dst_pin, _) = src.append_all_with_pin(&mut dst, src_pin, dst_pin);
        assert_eq!(new_dst_pin, src_pin);
    }
}
