// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Observational hooks: structured trace events for explain tooling and the `print` sink.
//! Neither affects the outcome of evaluation.

use core::fmt;

use spin::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// Evaluation of a query, rule or function body started.
    Enter { depth: usize, node: String },

    /// A body produced a solution.
    Exit { depth: usize, node: String },

    /// An expression is about to be evaluated.
    Eval { depth: usize, expr: String },

    /// An expression has no (further) solutions.
    Fail { depth: usize, expr: String },

    /// Message emitted by `trace(msg)`.
    Note { depth: usize, message: String },
}

impl TraceEvent {
    pub fn depth(&self) -> usize {
        match self {
            TraceEvent::Enter { depth, .. }
            | TraceEvent::Exit { depth, .. }
            | TraceEvent::Eval { depth, .. }
            | TraceEvent::Fail { depth, .. }
            | TraceEvent::Note { depth, .. } => *depth,
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            TraceEvent::Enter { .. } => "Enter",
            TraceEvent::Exit { .. } => "Exit",
            TraceEvent::Eval { .. } => "Eval",
            TraceEvent::Fail { .. } => "Fail",
            TraceEvent::Note { .. } => "Note",
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TraceEvent::Enter { node, .. } | TraceEvent::Exit { node, .. } => node,
            TraceEvent::Eval { expr, .. } | TraceEvent::Fail { expr, .. } => expr,
            TraceEvent::Note { message, .. } => message,
        };
        write!(f, "{} {text}", self.op())
    }
}

pub trait Tracer: Send + Sync {
    fn event(&self, event: TraceEvent);
}

/// Tracer that keeps every event in memory.
#[derive(Debug, Default)]
pub struct BufferedTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl BufferedTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Renders the events one per line, indented by depth.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        for e in self.events.lock().iter() {
            for _ in 0..e.depth() {
                out.push_str("| ");
            }
            out.push_str(&e.to_string());
            out.push('\n');
        }
        out
    }
}

impl Tracer for BufferedTracer {
    fn event(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

/// Destination of `print` output.
pub trait PrintSink: Send + Sync {
    fn print(&self, msg: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StderrPrinter;

impl PrintSink for StderrPrinter {
    fn print(&self, msg: &str) {
        eprintln!("{msg}");
    }
}

/// Collects printed lines, mostly for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct BufferedPrinter {
    lines: Mutex<Vec<String>>,
}

impl BufferedPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl PrintSink for BufferedPrinter {
    fn print(&self, msg: &str) {
        self.lines.lock().push(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_indents_by_depth() {
        let t = BufferedTracer::new();
        t.event(TraceEvent::Enter {
            depth: 0,
            node: "data.p".into(),
        });
        t.event(TraceEvent::Eval {
            depth: 1,
            expr: "x = 1".into(),
        });
        t.event(TraceEvent::Note {
            depth: 1,
            message: "hi".into(),
        });
        assert_eq!(t.pretty(), "Enter data.p\n| Eval x = 1\n| Note hi\n");
        assert_eq!(t.events().len(), 3);
        t.clear();
        assert!(t.events().is_empty());
    }
}
