//! Running a search on a dedicated thread.

use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use hardware::{MotionInterface, VoltageInterface};

use crate::clock::Clock;
use crate::error::SearchError;
use crate::search::{CancelToken, MagneticAxisSearch, SearchEvent, SearchReport};

/// Handle to a search running on its own thread.
pub struct SearchHandle {
    thread: JoinHandle<Result<SearchReport, SearchError>>,
    /// Progress events in emission order; closed when the search ends.
    pub events: Receiver<SearchEvent>,
    cancel: CancelToken,
}

impl SearchHandle {
    /// Request a cooperative stop; the search aborts between steps.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the search to end and return its report.
    pub fn join(self) -> Result<SearchReport, SearchError> {
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Move `search` onto a dedicated thread and return a handle to it.
pub fn spawn<M, V, C>(search: MagneticAxisSearch<M, V, C>) -> io::Result<SearchHandle>
where
    M: MotionInterface + Send + 'static,
    V: VoltageInterface + Send + 'static,
    C: Clock + Send + 'static,
{
    let (sender, events) = mpsc::channel();
    let mut search = search.with_events(sender);
    let cancel = search.cancel_token();
    let thread = thread::Builder::new()
        .name("magnetic-axis-search".into())
        .spawn(move || search.run())?;
    Ok(SearchHandle {
        thread,
        events,
        cancel,
    })
}
