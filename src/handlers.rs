use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::arguments::{
    materialize, ArgLimitChecker, ArgumentResolver, ArgumentSpec, NameCoercion, ResolvedCall,
    Signatures,
};
use crate::errors::DataError;
use crate::registry::Context;
use crate::userkeyword::UserKeyword;
use crate::variables::Replacer;

/// Arguments handed to a registered keyword implementation.
pub type CallArgs = ResolvedCall;

pub trait Func: Send + Sync {
    fn call(&self, ctx: &mut Context, args: CallArgs) -> Result<Value>;
}

impl<F> Func for F
where
    F: Fn(&mut Context, CallArgs) -> Result<Value> + Send + Sync + 'static,
{
    fn call(&self, ctx: &mut Context, args: CallArgs) -> Result<Value> {
        (self)(ctx, args)
    }
}

/// Binds call-site tokens to one calling convention.
pub trait ArgumentBinder {
    fn limit_checker(&self) -> ArgLimitChecker;

    fn bind(&self, args: &[String], replacer: &dyn Replacer) -> Result<ResolvedCall, DataError>;

    /// Arity check on unresolved tokens.
    fn check_for_dry_run(&self, args: &[String]) -> Result<(), DataError> {
        self.limit_checker().check_for_dry_run(args)
    }
}

pub struct PlainBinder<'a> {
    name: &'a str,
    spec: &'a ArgumentSpec,
}

impl<'a> PlainBinder<'a> {
    pub fn new(name: &'a str, spec: &'a ArgumentSpec) -> Self {
        Self { name, spec }
    }
}

impl ArgumentBinder for PlainBinder<'_> {
    fn limit_checker(&self) -> ArgLimitChecker {
        self.spec.limit_checker(self.name)
    }

    fn bind(&self, args: &[String], replacer: &dyn Replacer) -> Result<ResolvedCall, DataError> {
        let raw = ArgumentResolver::new(self.spec, NameCoercion::Raw).resolve(args)?;
        let call = raw.resolve(replacer)?;
        self.limit_checker().check(call.count())?;
        Ok(call)
    }
}

/// Keywords that run other keywords resolve only their first `resolved`
/// tokens. The rest reach the implementation as written, so the inner
/// keyword resolves them exactly once.
pub struct RunKeywordBinder<'a> {
    name: &'a str,
    spec: &'a ArgumentSpec,
    resolved: usize,
}

impl<'a> RunKeywordBinder<'a> {
    pub fn new(name: &'a str, spec: &'a ArgumentSpec, resolved: usize) -> Self {
        Self {
            name,
            spec,
            resolved,
        }
    }
}

impl ArgumentBinder for RunKeywordBinder<'_> {
    fn limit_checker(&self) -> ArgLimitChecker {
        self.spec.limit_checker(self.name)
    }

    fn bind(&self, args: &[String], replacer: &dyn Replacer) -> Result<ResolvedCall, DataError> {
        let (head, rest) = args.split_at(self.resolved.min(args.len()));
        let mut values = replacer.replace_list(head)?;
        values.extend(rest.iter().cloned().map(Value::String));
        self.limit_checker().check(values.len())?;
        Ok(ResolvedCall::positional(values))
    }
}

/// Dynamic keywords receive one positional list, so named values are folded
/// into their slots and defaults fill the skipped ones.
pub struct DynamicBinder<'a> {
    plain: PlainBinder<'a>,
}

impl<'a> DynamicBinder<'a> {
    pub fn new(name: &'a str, spec: &'a ArgumentSpec) -> Self {
        Self {
            plain: PlainBinder::new(name, spec),
        }
    }

    fn fold_named(&self, call: ResolvedCall, given: usize) -> Result<ResolvedCall, DataError> {
        let spec = self.plain.spec;
        let mut positional = call.positional;
        let mut named: Map<String, Value> = call.named;
        if named.is_empty() {
            return Ok(ResolvedCall::positional(positional));
        }
        let mut last = 0;
        for name in named.keys() {
            let index = spec.index_of(name).unwrap_or(0);
            if index < positional.len() {
                return Err(DataError::new(format!(
                    "Keyword '{}' got multiple values for argument '{name}'.",
                    self.plain.name
                )));
            }
            last = last.max(index);
        }
        for index in positional.len()..=last {
            let name = &spec.names()[index];
            match named.remove(name).or_else(|| spec.default_for(name).cloned()) {
                Some(value) => positional.push(value),
                None => {
                    self.limit_checker().check_missing(&[None], given)?;
                }
            }
        }
        Ok(ResolvedCall::positional(positional))
    }
}

impl ArgumentBinder for DynamicBinder<'_> {
    fn limit_checker(&self) -> ArgLimitChecker {
        self.plain.limit_checker()
    }

    fn bind(&self, args: &[String], replacer: &dyn Replacer) -> Result<ResolvedCall, DataError> {
        let call = self.plain.bind(args, replacer)?;
        let given = call.count();
        self.fold_named(call, given)
    }
}

/// Externally signatured keywords take every token positionally.
pub struct SignatureBinder<'a> {
    name: &'a str,
    signatures: &'a Signatures,
}

impl<'a> SignatureBinder<'a> {
    pub fn new(name: &'a str, signatures: &'a Signatures) -> Self {
        Self { name, signatures }
    }
}

impl ArgumentBinder for SignatureBinder<'_> {
    fn limit_checker(&self) -> ArgLimitChecker {
        self.signatures.limit_checker(self.name)
    }

    fn bind(&self, args: &[String], replacer: &dyn Replacer) -> Result<ResolvedCall, DataError> {
        let values = replacer.replace_list(args)?;
        self.limit_checker().check(values.len())?;
        let values = self.signatures.coerce(self.signatures.pack_varargs(values))?;
        Ok(ResolvedCall::positional(values))
    }
}

pub struct UserKeywordBinder<'a> {
    name: &'a str,
    spec: &'a ArgumentSpec,
}

impl<'a> UserKeywordBinder<'a> {
    pub fn new(name: &'a str, spec: &'a ArgumentSpec) -> Self {
        Self { name, spec }
    }
}

impl ArgumentBinder for UserKeywordBinder<'_> {
    fn limit_checker(&self) -> ArgLimitChecker {
        self.spec.limit_checker(self.name)
    }

    fn bind(&self, args: &[String], replacer: &dyn Replacer) -> Result<ResolvedCall, DataError> {
        let raw = ArgumentResolver::new(self.spec, NameCoercion::ScalarVariable).resolve(args)?;
        let call = raw.resolve(replacer)?;
        let checker = self.limit_checker();
        checker.check(call.count())?;
        let defaults = self
            .spec
            .defaults()
            .iter()
            .map(|default| match default {
                Value::String(text) => replacer.replace_scalar(text),
                other => Ok(other.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let values = materialize(call, self.spec, defaults, &checker, args.len())?;
        Ok(ResolvedCall::positional(values))
    }
}

/// The calling convention of a registered keyword.
pub enum HandlerKind {
    Library {
        spec: ArgumentSpec,
        func: Arc<dyn Func>,
    },
    Dynamic {
        spec: ArgumentSpec,
        func: Arc<dyn Func>,
    },
    Signatured {
        signatures: Signatures,
        func: Arc<dyn Func>,
    },
    RunKeyword {
        spec: ArgumentSpec,
        resolved: usize,
        func: Arc<dyn Func>,
    },
    User(Arc<UserKeyword>),
    /// Registration failed; every call fails with this error.
    Invalid(DataError),
}

pub struct Handler {
    name: String,
    library: Option<String>,
    kind: HandlerKind,
}

impl Handler {
    pub fn new(name: impl Into<String>, library: Option<String>, kind: HandlerKind) -> Self {
        Self {
            name: name.into(),
            library,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub fn longname(&self) -> String {
        match &self.library {
            Some(library) => format!("{library}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    pub fn is_user_keyword(&self) -> bool {
        matches!(self.kind, HandlerKind::User(_))
    }

    pub fn binder(&self) -> Result<Box<dyn ArgumentBinder + '_>, DataError> {
        match &self.kind {
            HandlerKind::Library { spec, .. } => Ok(Box::new(PlainBinder::new(&self.name, spec))),
            HandlerKind::Dynamic { spec, .. } => {
                Ok(Box::new(DynamicBinder::new(&self.name, spec)))
            }
            HandlerKind::Signatured { signatures, .. } => {
                Ok(Box::new(SignatureBinder::new(&self.name, signatures)))
            }
            HandlerKind::RunKeyword { spec, resolved, .. } => {
                Ok(Box::new(RunKeywordBinder::new(&self.name, spec, *resolved)))
            }
            HandlerKind::User(keyword) => {
                Ok(Box::new(UserKeywordBinder::new(&self.name, keyword.spec())))
            }
            HandlerKind::Invalid(err) => Err(err.clone()),
        }
    }
}
