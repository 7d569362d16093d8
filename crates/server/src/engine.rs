//! Evaluation Engine
//!
//! Runs request text through a two-phase compile policy against a shared
//! evaluation context, then executes the compiled unit:
//!
//! 1. compile as an implicit return expression (`1+1` yields `2`)
//! 2. on failure, compile the raw text as a statement sequence (`local x = 5`)
//! 3. if both fail, report the diagnostic from the *second* attempt
//! 4. otherwise execute; runtime faults and panics are captured, never raised
//!
//! The context is a trait so tests can swap in an isolated one while the
//! host binds the engine to its live interpreter state.

use crate::protocol::ServerMessage;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// How request text is turned into an executable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// Text is an expression whose value is returned
    Expression,
    /// Text is a free-form statement sequence
    Statements,
}

/// The namespace requests are compiled and executed in
///
/// Implementations are not sandboxed: executed code may read and mutate
/// whatever state the context exposes.
pub trait EvalContext {
    /// A compiled, not yet executed, unit of code
    type Unit;

    /// Compile without running. `Err` carries the compiler diagnostic.
    fn compile(&self, source: &str, mode: CompileMode) -> Result<Self::Unit, String>;

    /// Run a compiled unit
    ///
    /// `Ok` carries the textual form of the first produced value, or the
    /// context's rendering of "no value". `Err` carries the fault description.
    fn execute(&self, unit: Self::Unit) -> Result<String, String>;
}

/// Classified outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Value(String),
    CompileError(String),
    RuntimeFault(String),
}

impl Evaluation {
    pub fn is_success(&self) -> bool {
        matches!(self, Evaluation::Value(_))
    }

    /// Convert to the `eval_result` frame sent to the client
    pub fn into_message(self) -> ServerMessage {
        match self {
            Evaluation::Value(text) => ServerMessage::success(text),
            Evaluation::CompileError(diagnostic) => {
                ServerMessage::failure(format!("Compile error: {}", diagnostic))
            }
            Evaluation::RuntimeFault(description) => {
                ServerMessage::failure(format!("Error: {}", description))
            }
        }
    }
}

/// Compile-then-run pipeline over an evaluation context
pub struct Engine<C> {
    context: C,
}

impl<C: EvalContext> Engine<C> {
    pub fn new(context: C) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    /// Evaluate one request
    pub fn evaluate(&self, expression: &str) -> Evaluation {
        let unit = match self.compile(expression) {
            Ok(unit) => unit,
            Err(diagnostic) => return Evaluation::CompileError(diagnostic),
        };

        // Host callbacks may panic; that must not unwind into the tick loop
        match panic::catch_unwind(AssertUnwindSafe(|| self.context.execute(unit))) {
            Ok(Ok(text)) => Evaluation::Value(text),
            Ok(Err(fault)) => Evaluation::RuntimeFault(fault),
            Err(payload) => Evaluation::RuntimeFault(format_panic_payload(&payload)),
        }
    }

    fn compile(&self, expression: &str) -> Result<C::Unit, String> {
        let attempt = |mode: CompileMode| {
            panic::catch_unwind(AssertUnwindSafe(|| self.context.compile(expression, mode)))
                .unwrap_or_else(|payload| Err(format_panic_payload(&payload)))
        };

        attempt(CompileMode::Expression).or_else(|_| attempt(CompileMode::Statements))
    }
}

/// Format a panic payload into an error message
pub fn format_panic_payload(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
