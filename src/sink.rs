//! Progress and error reporting for [`ArchiveSession`](crate::ArchiveSession).

/// Receives human-readable progress and error lines from a session.
pub trait Sink {
    fn on_progress(&self, _message: &str) {}

    fn on_error(&self, _message: &str) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {}

/// Progress to stdout, errors to stderr, both only when verbose.
///
/// The binary reports the error that ends a command on its own, so a quiet
/// console prints nothing here.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink {
    pub verbose: bool,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Sink for ConsoleSink {
    fn on_progress(&self, message: &str) {
        if self.verbose {
            println!("{message}");
        }
    }

    fn on_error(&self, message: &str) {
        if self.verbose {
            eprintln!("{message}");
        }
    }
}
