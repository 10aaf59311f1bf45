use std::fmt;

/// Error in test data or in a keyword definition. `syntax` errors are never
/// continuable, not even in teardowns or templated tests.
#[derive(Debug, Clone, PartialEq)]
pub struct DataError {
    message: String,
    syntax: bool,
}

impl DataError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            syntax: false,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            syntax: true,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_syntax(&self) -> bool {
        self.syntax
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DataError {}

/// Failure raised by a keyword implementation that wants to control how the
/// failure is classified.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordError {
    pub message: String,
    pub continuable: bool,
    pub timeout: bool,
    pub fatal: bool,
}

impl KeywordError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            continuable: false,
            timeout: false,
            fatal: false,
        }
    }

    pub fn continuable(message: impl Into<String>) -> Self {
        Self {
            continuable: true,
            ..Self::new(message)
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timeout: true,
            ..Self::new(message)
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(message)
        }
    }
}

impl fmt::Display for KeywordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for KeywordError {}

/// Control flow requested by a keyword. These are not failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionSignal {
    ContinueLoop,
    ExitLoop,
    PassExecution(String),
}

impl ExecutionSignal {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionSignal::ContinueLoop => "continue",
            ExecutionSignal::ExitLoop => "break",
            ExecutionSignal::PassExecution(_) => "pass",
        }
    }
}

impl fmt::Display for ExecutionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionSignal::PassExecution(message) => write!(f, "flow signal: pass ({message})"),
            other => write!(f, "flow signal: {}", other.name()),
        }
    }
}

impl std::error::Error for ExecutionSignal {}
