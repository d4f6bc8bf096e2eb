//! Classification of git's stderr into ignorable chatter and fatal errors.
//!
//! git keeps writing patch data to stdout after some internal failures, so the
//! stderr verdict is authoritative: one fatal line invalidates the whole run.
//! Known-benign messages live in a rule table rather than in control flow.

use std::fmt;
use std::io::{BufRead as _, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use aho_corasick::AhoCorasick;
use thiserror::Error;
use tracing::{error, warn};

/// Substrings of stderr lines that git emits when it gives up on rename
/// detection, together with the remediation hint that follows them. git still
/// produces a complete patch in these cases.
pub const DEFAULT_IGNORABLE: &[&str] = &[
    "exhaustive rename detection was skipped",
    "inexact rename detection was skipped",
    "you may want to set your diff.renameLimit",
];

const CLASSIFIER_THREAD_NAME: &str = "git-stderr";

/// Verdict for a single diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Known-benign; reported as a warning.
    Ignorable,
    /// Anything else; fails the run.
    Fatal,
}

/// Table of substrings that mark a diagnostic line as ignorable.
#[derive(Clone)]
pub struct DiagnosticRules {
    patterns: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl DiagnosticRules {
    /// Builds a rule table from exactly the given substrings.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p| !p.is_empty())
            .collect();
        let automaton = build_automaton(&patterns);
        Self { patterns, automaton }
    }

    /// Builds the default table extended with user-supplied substrings.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let defaults = DEFAULT_IGNORABLE.iter().map(|&p| p.to_string());
        Self::new(defaults.chain(extra.into_iter().map(Into::into)))
    }

    /// The substrings in this table.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Classifies one line of stderr.
    #[must_use]
    pub fn classify(&self, line: &str) -> Classification {
        let matched = match &self.automaton {
            Some(automaton) => automaton.is_match(line),
            None => self.patterns.iter().any(|p| line.contains(p.as_str())),
        };

        if matched {
            Classification::Ignorable
        } else {
            Classification::Fatal
        }
    }
}

impl Default for DiagnosticRules {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORABLE.iter().copied())
    }
}

impl fmt::Debug for DiagnosticRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticRules")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

fn build_automaton(patterns: &[String]) -> Option<AhoCorasick> {
    if patterns.is_empty() {
        return None;
    }

    AhoCorasick::new(patterns).ok()
}

/// git wrote at least one non-ignorable line to stderr.
#[derive(Debug, Clone, Error)]
#[error("git reported a fatal error: {}", .lines.join("; "))]
pub struct DiagnosticFatal {
    /// The fatal lines, in the order they were emitted.
    pub lines: Vec<String>,
}

/// Everything the classifier saw on one stderr stream.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    /// Ignorable lines, already reported as warnings.
    pub warnings: Vec<String>,
    /// Fatal lines.
    pub fatal: Vec<String>,
}

impl DiagnosticReport {
    /// Returns `true` if any fatal line was observed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.fatal.is_empty()
    }

    /// Converts the report into the run outcome, yielding the warnings on success.
    pub fn into_result(self) -> Result<Vec<String>, DiagnosticFatal> {
        if self.fatal.is_empty() {
            Ok(self.warnings)
        } else {
            Err(DiagnosticFatal { lines: self.fatal })
        }
    }

    fn fatal_only(line: String) -> Self {
        Self {
            warnings: Vec::new(),
            fatal: vec![line],
        }
    }
}

/// Cancellation flag raised by the classifier on the first fatal line and
/// polled by whoever consumes the paired stdout.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Creates a signal in the lowered state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Idempotent.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once the signal has been raised.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Reads `reader` line by line until EOF, classifying every non-blank line.
///
/// Raises `abort` on the first fatal line but keeps reading so the producer
/// never blocks on a full stderr pipe.
pub fn classify_stream<R: Read>(reader: R, rules: &DiagnosticRules, abort: &AbortSignal) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();

    for chunk in BufReader::new(reader).split(b'\n') {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let line = format!("failed to read git diagnostics: {e}");
                error!("{line}");
                report.fatal.push(line);
                abort.raise();
                break;
            }
        };

        let decoded = String::from_utf8_lossy(&bytes);
        let line = decoded.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        match rules.classify(line) {
            Classification::Ignorable => {
                warn!("{line}");
                report.warnings.push(line.to_string());
            }
            Classification::Fatal => {
                error!("{line}");
                report.fatal.push(line.to_string());
                abort.raise();
            }
        }
    }

    report
}

/// A classifier running on its own thread.
#[derive(Debug)]
pub struct ClassifierHandle {
    state: ClassifierState,
}

#[derive(Debug)]
enum ClassifierState {
    Running(JoinHandle<DiagnosticReport>),
    Failed(DiagnosticReport),
}

impl ClassifierHandle {
    /// Waits for the stderr stream to close and returns the full report.
    #[must_use]
    pub fn join(self) -> DiagnosticReport {
        match self.state {
            ClassifierState::Running(thread) => thread
                .join()
                .unwrap_or_else(|_| DiagnosticReport::fatal_only("diagnostic classifier panicked".to_string())),
            ClassifierState::Failed(report) => report,
        }
    }
}

/// Starts classifying `stderr` on a dedicated thread.
///
/// If the thread cannot be started the run is treated as failed, since an
/// undrained stderr pipe can stall the child indefinitely.
pub fn spawn_classifier<R>(stderr: R, rules: DiagnosticRules, abort: AbortSignal) -> ClassifierHandle
where
    R: Read + Send + 'static,
{
    let thread_abort = abort.clone();
    let spawned = thread::Builder::new()
        .name(CLASSIFIER_THREAD_NAME.to_string())
        .spawn(move || classify_stream(stderr, &rules, &thread_abort));

    let state = match spawned {
        Ok(thread) => ClassifierState::Running(thread),
        Err(e) => {
            abort.raise();
            ClassifierState::Failed(DiagnosticReport::fatal_only(format!(
                "failed to start diagnostic classifier: {e}"
            )))
        }
    };

    ClassifierHandle { state }
}
