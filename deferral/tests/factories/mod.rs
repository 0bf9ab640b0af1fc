//! Factory wrappers shared by the handle tests.

use std::cell::Cell;
use std::rc::Rc;

/// Wraps `make` so the number of factory invocations can be observed.
pub fn counting<T>(make: impl FnOnce() -> T + 'static) -> (Rc<Cell<usize>>, impl FnOnce() -> T) {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let factory = move || {
        counter.set(counter.get() + 1);
        make()
    };
    (calls, factory)
}
