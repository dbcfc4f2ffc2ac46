//! Merge engine - combine N cells into one derived cell.
//!
//! [`merge`] takes a tuple of [`Readable`] sources (1 to 6, heterogeneous
//! types) and a combine function over their values. The merged cell:
//!
//! - computes its initial value once, at construction, not on first
//!   observation;
//! - on any upstream change event recomputes with the *current* value of
//!   every source and notifies exactly once - a write that fans out into
//!   two sources of the same merge coalesces into one recomputation on the
//!   final values (see [`scheduler`](super::scheduler));
//! - treats every combine result as a value: `Option::None` from a combiner
//!   is delivered to observers like anything else, replayed to fresh
//!   observers, and re-delivered once per upstream event even when repeated;
//! - detaches from every source once the last handle to it drops.

use std::any::Any;
use std::rc::{Rc, Weak};

use super::cell::{RawCell, Readable, StopHandle, SubscriptionGuard};
use super::scheduler::{self, Deferred};

// =============================================================================
// Source tuples
// =============================================================================

/// A tuple of readable cells usable as merge input. Implemented for tuples
/// of [`Readable`] up to arity 6; pass `writable.readable()` for writables.
pub trait MergeSources: Clone + 'static {
    /// The tuple of current source values handed to the combine function.
    type Values;

    /// Snapshot the current value of every source.
    fn current(&self) -> Self::Values;

    /// Subscribe `on_change` to every source, without replay.
    fn subscribe(&self, on_change: &Rc<dyn Fn()>) -> Vec<StopHandle>;
}

macro_rules! impl_merge_sources {
    ($( ( $( ($ty:ident, $idx:tt) ),+ ) ),+ $(,)?) => {
        $(
            impl<$( $ty: Clone + 'static ),+> MergeSources for ( $( Readable<$ty>, )+ ) {
                type Values = ( $( $ty, )+ );

                fn current(&self) -> Self::Values {
                    ( $( self.$idx.get(), )+ )
                }

                fn subscribe(&self, on_change: &Rc<dyn Fn()>) -> Vec<StopHandle> {
                    let mut handles = Vec::new();
                    $(
                        {
                            let notify = on_change.clone();
                            handles.push(self.$idx.subscribe_changes(move |_| notify()));
                        }
                    )+
                    handles
                }
            }
        )+
    };
}

impl_merge_sources!(
    ((A, 0)),
    ((A, 0), (B, 1)),
    ((A, 0), (B, 1), (C, 2)),
    ((A, 0), (B, 1), (C, 2), (D, 3)),
    ((A, 0), (B, 1), (C, 2), (D, 3), (E, 4)),
    ((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5)),
);

// =============================================================================
// Merge
// =============================================================================

struct MergeTask<S, R, F>
where
    S: MergeSources,
    R: Clone + 'static,
    F: Fn(S::Values) -> R,
{
    target: Weak<RawCell<R>>,
    sources: S,
    combine: F,
}

impl<S, R, F> Deferred for MergeTask<S, R, F>
where
    S: MergeSources,
    R: Clone + 'static,
    F: Fn(S::Values) -> R,
{
    fn run(&self) {
        let Some(target) = self.target.upgrade() else {
            return;
        };
        let next = (self.combine)(self.sources.current());
        target.store(next);
    }
}

/// Combine the given source cells into one derived read-only cell.
///
/// ```ignore
/// let a = Writable::new(2);
/// let b = Writable::new(4);
/// let sum = merge((a.readable(), b.readable()), |(a, b)| a + b);
/// assert_eq!(sum.get(), 6);
/// ```
pub fn merge<S, R>(sources: S, combine: impl Fn(S::Values) -> R + 'static) -> Readable<R>
where
    S: MergeSources,
    R: Clone + 'static,
{
    let initial = combine(sources.current());
    let target = Rc::new(RawCell::new(initial));

    let task: Rc<dyn Deferred> = Rc::new(MergeTask {
        target: Rc::downgrade(&target),
        sources: sources.clone(),
        combine,
    });
    let on_change: Rc<dyn Fn()> = Rc::new(move || scheduler::schedule(task.clone()));
    let handles = sources.subscribe(&on_change);

    let upstream: Vec<Box<dyn Any>> = vec![Box::new(sources)];
    Readable::from_parts(
        target,
        Some(Rc::new(SubscriptionGuard::new(handles, upstream))),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::cell::Writable;
    use crate::reactive::scheduler::batch;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_merge_initial_value_then_single_notify() {
        let a = Writable::new(2);
        let b = Writable::new(4);
        let sum = merge((a.readable(), b.readable()), |(a, b)| a + b);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _stop = sum.observe(move |v| seen_clone.borrow_mut().push(*v));

        assert_eq!(*seen.borrow(), vec![6], "observing replays 6 immediately");

        b.set(16);
        assert_eq!(
            *seen.borrow(),
            vec![6, 18],
            "one upstream change, exactly one further notification"
        );
    }

    #[test]
    fn test_merge_recomputes_with_all_current_values() {
        let a = Writable::new(1);
        let b = Writable::new(10);
        let pair = merge((a.readable(), b.readable()), |(a, b)| (a, b));

        a.set(2);
        assert_eq!(pair.get(), (2, 10), "untouched sources read current value");
        b.set(20);
        assert_eq!(pair.get(), (2, 20));
    }

    #[test]
    fn test_merge_none_is_a_value() {
        // Combiner yields None whenever the two booleans disagree.
        let left = Writable::new(true);
        let right = Writable::new(false);
        let agreement = merge((left.readable(), right.readable()), |(l, r)| {
            if l == r { Some(l) } else { None }
        });

        let seen: Rc<RefCell<Vec<Option<bool>>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _stop = agreement.observe(move |v| seen_clone.borrow_mut().push(*v));

        assert_eq!(
            *seen.borrow(),
            vec![None],
            "None must be delivered to a fresh observer, not swallowed"
        );

        right.set(true); // agree -> Some(true)
        left.set(false); // disagree again -> None, delivered once more
        assert_eq!(*seen.borrow(), vec![None, Some(true), None]);
    }

    #[test]
    fn test_fan_out_single_recompute() {
        // One writable feeding both sources through map: a single set must
        // produce exactly one recomputation, on final values.
        let root = Writable::new(1);
        let double = root.map(|v| v * 2);
        let triple = root.map(|v| v * 3);

        let recomputes = Rc::new(Cell::new(0));
        let recomputes_clone = recomputes.clone();
        let combined = merge((double, triple), move |(d, t)| {
            recomputes_clone.set(recomputes_clone.get() + 1);
            d + t
        });
        assert_eq!(recomputes.get(), 1); // construction
        assert_eq!(combined.get(), 5);

        let notifications = Rc::new(Cell::new(0));
        let notifications_clone = notifications.clone();
        let _stop = combined.observe(move |_| notifications_clone.set(notifications_clone.get() + 1));
        assert_eq!(notifications.get(), 1); // replay

        root.set(2);
        assert_eq!(recomputes.get(), 2, "diamond coalesces into one recompute");
        assert_eq!(notifications.get(), 2, "and one notification");
        assert_eq!(combined.get(), 10);
    }

    #[test]
    fn test_batch_coalesces_across_writables() {
        let a = Writable::new(1);
        let b = Writable::new(2);
        let notifications = Rc::new(Cell::new(0));

        let sum = merge((a.readable(), b.readable()), |(a, b)| a + b);
        let notifications_clone = notifications.clone();
        let _stop = sum.observe(move |_| notifications_clone.set(notifications_clone.get() + 1));
        assert_eq!(notifications.get(), 1);

        batch(|| {
            a.set(10);
            b.set(20);
        });
        assert_eq!(
            notifications.get(),
            2,
            "batched writes produce one merge notification"
        );
        assert_eq!(sum.get(), 30);

        // Unbatched, the two writes are two genuine events.
        a.set(100);
        b.set(200);
        assert_eq!(notifications.get(), 4);
    }

    #[test]
    fn test_merge_three_sources() {
        let a = Writable::new("a".to_string());
        let b = Writable::new(1u32);
        let c = Writable::new(true);
        let joined = merge(
            (a.readable(), b.readable(), c.readable()),
            |(a, b, c)| format!("{a}-{b}-{c}"),
        );
        assert_eq!(joined.get(), "a-1-true");
        b.set(2);
        assert_eq!(joined.get(), "a-2-true");
    }

    #[test]
    fn test_dropping_merged_cell_detaches_from_sources() {
        let a = Writable::new(1);
        let b = Writable::new(2);
        let recomputes = Rc::new(Cell::new(0));
        let recomputes_clone = recomputes.clone();
        let merged = merge((a.readable(), b.readable()), move |(a, b)| {
            recomputes_clone.set(recomputes_clone.get() + 1);
            a + b
        });
        assert_eq!(recomputes.get(), 1);

        drop(merged);
        a.set(5);
        b.set(6);
        assert_eq!(
            recomputes.get(),
            1,
            "a dropped merge must not keep recomputing"
        );
    }
}
