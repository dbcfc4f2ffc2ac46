//! Propagation turns - the queue behind glitch-free merges.
//!
//! Every `set`/`update` on a writable opens a *turn* (or joins the one
//! already open when called from inside an observer). Direct observers and
//! `map` chains run synchronously in-line; merged cells defer their
//! recomputation into the turn's queue instead. The queue drains when the
//! outermost write finishes its own notification pass, so a write that fans
//! out into several sources of one merge produces a single recomputation on
//! final values.
//!
//! The model is single-threaded and cooperative; all state is thread-local.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Work deferred to the end of the current turn.
pub(crate) trait Deferred {
    fn run(&self);
}

struct TurnState {
    depth: u32,
    queue: VecDeque<Rc<dyn Deferred>>,
}

thread_local! {
    static TURN: RefCell<TurnState> = RefCell::new(TurnState {
        depth: 0,
        queue: VecDeque::new(),
    });
}

/// Run `work` inside the current turn, opening one if none is active. The
/// opener drains the deferred queue after its own notification pass.
pub(crate) fn run_turn<R>(work: impl FnOnce() -> R) -> R {
    let opened = TURN.with(|turn| {
        let mut turn = turn.borrow_mut();
        turn.depth += 1;
        turn.depth == 1
    });

    let out = work();

    if opened {
        drain();
    }
    TURN.with(|turn| turn.borrow_mut().depth -= 1);
    out
}

/// Enqueue deferred work, deduplicated by identity while pending. Outside a
/// turn the task runs immediately.
pub(crate) fn schedule(task: Rc<dyn Deferred>) {
    let queued = TURN.with(|turn| {
        let mut turn = turn.borrow_mut();
        if turn.depth == 0 {
            return false;
        }
        if !turn.queue.iter().any(|pending| Rc::ptr_eq(pending, &task)) {
            turn.queue.push_back(task.clone());
        }
        true
    });
    if !queued {
        task.run();
    }
}

fn drain() {
    // Tasks may enqueue further tasks (observers setting writables); keep
    // going until the queue is empty.
    loop {
        let next = TURN.with(|turn| turn.borrow_mut().queue.pop_front());
        match next {
            Some(task) => task.run(),
            None => break,
        }
    }
}

/// Group several writes into one turn: every merged cell downstream of the
/// writes recomputes and notifies once, at the end. Direct observers are NOT
/// coalesced - each write still notifies them synchronously.
pub fn batch<R>(work: impl FnOnce() -> R) -> R {
    run_turn(work)
}
