use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::arguments::{ArgumentSpec, Signatures};
use crate::errors::DataError;
use crate::handlers::{Func, Handler, HandlerKind};
use crate::keyword::Keyword;
use crate::outcome::{ContinueContext, Outcome};
use crate::output::{Listener, Output};
use crate::settings::RunSettings;
use crate::userkeyword::UserKeyword;
use crate::variables::{normalize_name, Variables};

/// Nested keyword calls deeper than this fail instead of overflowing.
const MAX_CALL_DEPTH: usize = 100;

struct RegistryInner {
    handlers: HashMap<String, Vec<Arc<Handler>>>,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    fn insert(&mut self, handler: Handler) {
        let key = normalize_name(handler.name());
        let entries = self.handlers.entry(key).or_default();
        let library = handler.library().map(normalize_name);
        entries.retain(|existing| existing.library().map(normalize_name) != library);
        entries.push(Arc::new(handler));
    }

    fn find(&self, name: &str) -> Result<Arc<Handler>, DataError> {
        if let Some(found) = self.handlers.get(&normalize_name(name)) {
            match found.as_slice() {
                [only] => return Ok(only.clone()),
                [] => {}
                many => return pick_one(name, many),
            }
        }
        if let Some((library, keyword)) = name.rsplit_once('.') {
            let library = normalize_name(library);
            let found = self
                .handlers
                .get(&normalize_name(keyword))
                .and_then(|entries| {
                    entries
                        .iter()
                        .find(|handler| handler.library().map(normalize_name).as_ref() == Some(&library))
                });
            if let Some(handler) = found {
                return Ok(handler.clone());
            }
        }
        Err(DataError::new(format!("No keyword with name '{name}' found.")))
    }
}

/// User keywords take precedence over library keywords of the same name.
fn pick_one(name: &str, candidates: &[Arc<Handler>]) -> Result<Arc<Handler>, DataError> {
    let user: Vec<&Arc<Handler>> = candidates.iter().filter(|h| h.library().is_none()).collect();
    if let [only] = user.as_slice() {
        return Ok((*only).clone());
    }
    Err(DataError::new(format!(
        "Multiple keywords with name '{name}' found."
    )))
}

pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::new())),
        }
    }

    /// Registers a keyword that binds arguments by position and name.
    pub fn register<F>(&self, name: impl Into<String>, spec: ArgumentSpec, func: F)
    where
        F: Func + 'static,
    {
        self.register_handler(None, name, HandlerKind::Library {
            spec,
            func: Arc::new(func),
        });
    }

    pub fn register_in_library<F>(
        &self,
        library: impl Into<String>,
        name: impl Into<String>,
        spec: ArgumentSpec,
        func: F,
    ) where
        F: Func + 'static,
    {
        self.register_handler(Some(library.into()), name, HandlerKind::Library {
            spec,
            func: Arc::new(func),
        });
    }

    /// Registers a keyword that runs another keyword. Only the first
    /// `resolved` arguments are resolved before the call; the rest are
    /// passed on unresolved.
    pub fn register_run_keyword<F>(
        &self,
        library: impl Into<String>,
        name: impl Into<String>,
        resolved: usize,
        spec: ArgumentSpec,
        func: F,
    ) where
        F: Func + 'static,
    {
        self.register_handler(Some(library.into()), name, HandlerKind::RunKeyword {
            spec,
            resolved,
            func: Arc::new(func),
        });
    }

    /// Registers a dynamic keyword described by a string specification such
    /// as `["a", "b=1", "*rest"]`. An invalid specification registers a
    /// keyword that fails when used.
    pub fn register_dynamic<F>(&self, name: impl Into<String>, spec: Option<&[String]>, func: F)
    where
        F: Func + 'static,
    {
        let kind = match ArgumentSpec::from_dynamic(spec) {
            Ok(spec) => HandlerKind::Dynamic {
                spec,
                func: Arc::new(func),
            },
            Err(err) => HandlerKind::Invalid(err),
        };
        self.register_handler(None, name, kind);
    }

    pub fn register_signatured<F>(&self, name: impl Into<String>, signatures: Signatures, func: F)
    where
        F: Func + 'static,
    {
        self.register_handler(None, name, HandlerKind::Signatured {
            signatures,
            func: Arc::new(func),
        });
    }

    /// Registering the same user keyword name twice leaves a keyword that
    /// fails when used.
    pub fn register_user_keyword(&self, keyword: UserKeyword) {
        let name = keyword.name.clone();
        let key = normalize_name(&name);
        let duplicate = {
            let inner = self.inner.lock().expect("registry poisoned");
            inner
                .handlers
                .get(&key)
                .map_or(false, |entries| entries.iter().any(|h| h.library().is_none()))
        };
        let kind = if duplicate {
            HandlerKind::Invalid(DataError::new(format!(
                "Keyword '{name}' defined multiple times."
            )))
        } else {
            HandlerKind::User(Arc::new(keyword))
        };
        self.register_handler(None, name, kind);
    }

    /// Registers a name that fails with `error` whenever it is called.
    pub fn register_invalid(&self, name: impl Into<String>, error: DataError) {
        self.register_handler(None, name, HandlerKind::Invalid(error));
    }

    fn register_handler(&self, library: Option<String>, name: impl Into<String>, kind: HandlerKind) {
        let handler = Handler::new(name, library, kind);
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner.insert(handler);
    }

    pub fn handler(&self, name: &str) -> Result<Arc<Handler>, DataError> {
        let inner = self.inner.lock().expect("registry poisoned");
        inner.find(name)
    }

    pub fn context(&self) -> Context {
        Context::new(self.inner.clone(), RunSettings::default())
    }

    pub fn context_with_settings(&self, settings: RunSettings) -> Context {
        Context::new(self.inner.clone(), settings)
    }
}

/// Execution state shared by every node of a run: variables, the trace
/// sink and the flags that decide how failures propagate.
pub struct Context {
    registry: Arc<Mutex<RegistryInner>>,
    variables: Variables,
    output: Output,
    settings: RunSettings,
    scope_depth: usize,
    teardown_depth: usize,
    templated: bool,
    timeout_occurred: bool,
}

impl Context {
    fn new(registry: Arc<Mutex<RegistryInner>>, settings: RunSettings) -> Self {
        Self {
            registry,
            variables: Variables::new(),
            output: Output::new(settings.log_level),
            settings,
            scope_depth: 0,
            teardown_depth: 0,
            templated: false,
            timeout_occurred: false,
        }
    }

    pub fn handler(&self, name: &str) -> Result<Arc<Handler>, DataError> {
        let inner = self.registry.lock().expect("registry poisoned");
        inner.find(name)
    }

    pub fn registry_clone(&self) -> Registry {
        Registry {
            inner: self.registry.clone(),
        }
    }

    /// Runs a keyword by name with unresolved argument tokens.
    pub fn run_keyword(&mut self, name: &str, args: Vec<String>) -> Outcome {
        Keyword::new(name).with_args(args).run(self)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), DataError> {
        self.variables.set(name, value)
    }

    pub fn set_global_variable(&mut self, name: &str, value: Value) -> Result<(), DataError> {
        self.variables.set_global(name, value)
    }

    /// Runs `body` in a fresh local variable scope that sees only globals.
    pub fn with_variable_scope<R>(&mut self, body: impl FnOnce(&mut Context) -> R) -> R {
        self.variables.start_local_scope();
        let result = body(self);
        self.variables.end_local_scope();
        result
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut Output {
        &mut self.output
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.output.add_listener(listener);
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn dry_run(&self) -> bool {
        self.settings.dry_run
    }

    pub fn push_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn pop_scope(&mut self) {
        if self.scope_depth > 0 {
            self.scope_depth -= 1;
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scope_depth
    }

    pub(crate) fn call_depth_exceeded(&self) -> bool {
        self.scope_depth > MAX_CALL_DEPTH
    }

    pub fn in_teardown(&self) -> bool {
        self.teardown_depth > 0
    }

    pub fn in_teardown_scope<R>(&mut self, body: impl FnOnce(&mut Context) -> R) -> R {
        self.teardown_depth += 1;
        let result = body(self);
        self.teardown_depth -= 1;
        result
    }

    pub fn templated(&self) -> bool {
        self.templated
    }

    pub fn with_templated<R>(&mut self, templated: bool, body: impl FnOnce(&mut Context) -> R) -> R {
        let previous = std::mem::replace(&mut self.templated, templated);
        let result = body(self);
        self.templated = previous;
        result
    }

    pub fn continue_context(&self) -> ContinueContext {
        ContinueContext {
            in_teardown: self.in_teardown(),
            templated: self.templated,
            dry_run: self.dry_run(),
        }
    }

    pub fn timeout_occurred(&self) -> bool {
        self.timeout_occurred
    }

    pub fn set_timeout_occurred(&mut self, occurred: bool) {
        self.timeout_occurred = occurred;
    }

    pub fn trace<F>(&mut self, message: F)
    where
        F: FnOnce() -> String,
    {
        self.output.trace(message);
    }

    pub fn debug<F>(&mut self, message: F)
    where
        F: FnOnce() -> String,
    {
        self.output.debug(message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.output.info(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.output.warn(message);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.output.fail(message);
    }
}
