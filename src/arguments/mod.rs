mod limits;
mod materializer;
mod resolver;
mod signatures;
mod spec;

pub use limits::ArgLimitChecker;
pub use materializer::materialize;
pub use resolver::{ArgumentResolver, NameCoercion, RawCall, ResolvedCall};
pub use signatures::{ParamType, Signatures};
pub use spec::ArgumentSpec;
