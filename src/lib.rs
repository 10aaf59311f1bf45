pub mod arguments;
pub mod arith;
pub mod assign;
pub mod builtin;
pub mod errors;
pub mod fixture;
pub mod for_loop;
pub mod handlers;
pub mod keyword;
pub mod model;
pub mod outcome;
pub mod output;
pub mod registry;
pub mod result;
pub mod runner;
pub mod settings;
pub mod steps;
pub mod userkeyword;
pub mod variables;

pub use arguments::{ArgLimitChecker, ArgumentSpec, ParamType, ResolvedCall, Signatures};
pub use builtin::register_builtin;
pub use errors::{DataError, ExecutionSignal, KeywordError};
pub use fixture::{FailureListener, Fixture};
pub use for_loop::{ForFlavor, ForLoop};
pub use handlers::CallArgs;
pub use keyword::Keyword;
pub use model::{parse_steps, parse_steps_yaml, ResourceData, UserKeywordData};
pub use outcome::{Failure, Failures, Outcome, Status};
pub use output::{Listener, LogLevel, LogMessage};
pub use registry::{Context, Registry};
pub use result::{KeywordResult, NodeType};
pub use runner::{TestCase, TestResult};
pub use settings::RunSettings;
pub use steps::{Keywords, Step};
pub use userkeyword::UserKeyword;
pub use variables::{Replacer, Variables};
