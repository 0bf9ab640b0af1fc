//! Shared fixtures for the integration tests.

use std::cell::Cell;
use std::rc::Rc;

use deferral::{CleanupError, CleanupResult, Dispose, DisposeState};

/// How a [`Tracker`] behaves when disposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Clean,
    Fail,
    Panic,
}

/// A disposable that counts its releases.
#[derive(Debug)]
pub struct Tracker {
    release: Release,
    calls: Cell<usize>,
}

impl Tracker {
    pub fn new(release: Release) -> Rc<Self> {
        Rc::new(Self {
            release,
            calls: Cell::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Dispose for Tracker {
    fn dispose(&self) -> CleanupResult {
        self.calls.set(self.calls.get() + 1);
        match self.release {
            Release::Clean => Ok(()),
            Release::Fail => Err(CleanupError::failed("tracker refused to close")),
            Release::Panic => panic!("tracker exploded"),
        }
    }
}

impl DisposeState for Tracker {
    fn disposed(&self) -> bool {
        self.calls.get() > 0
    }
}
