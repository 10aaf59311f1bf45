use anyhow::{anyhow, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DataError;
use crate::fixture::Fixture;
use crate::registry::{Context, Registry};
use crate::runner::{TestCase, TestResult};
use crate::steps::Step;
use crate::userkeyword::UserKeyword;
use crate::variables::is_var;

/// A user keyword as written in test data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserKeywordData {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub body: Vec<Step>,
    #[serde(default, rename = "return")]
    pub returns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<Fixture>,
    #[serde(default)]
    pub doc: String,
}

impl UserKeywordData {
    pub fn build(&self) -> Result<UserKeyword, DataError> {
        let mut keyword = UserKeyword::new(&self.name, &self.args, self.body.clone())?
            .with_return(self.returns.iter().cloned())
            .with_doc(self.doc.clone());
        if let Some(teardown) = &self.teardown {
            keyword = keyword.with_teardown(teardown.clone());
        }
        Ok(keyword)
    }
}

/// Variables, user keywords and tests loaded together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub keywords: Vec<UserKeywordData>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl ResourceData {
    pub fn from_json(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|err| anyhow!("invalid resource: {err}"))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).context("invalid JSON resource")?;
        Self::from_json(&value)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text).context("invalid YAML resource")?;
        Self::from_json(&value)
    }

    /// Keywords that cannot be built are still registered and fail with the
    /// creation error when called.
    pub fn register_keywords(&self, registry: &Registry) {
        for data in &self.keywords {
            match data.build() {
                Ok(keyword) => registry.register_user_keyword(keyword),
                Err(err) => registry.register_invalid(
                    &data.name,
                    DataError::syntax(format!(
                        "Creating keyword '{}' failed: {}",
                        data.name,
                        err.message()
                    )),
                ),
            }
        }
    }

    /// Registers the keywords and sets the variables as globals.
    pub fn import(&self, ctx: &mut Context) -> Result<()> {
        self.register_keywords(&ctx.registry_clone());
        for (name, value) in &self.variables {
            let name = if is_var(name) {
                name.clone()
            } else {
                format!("${{{name}}}")
            };
            ctx.set_global_variable(&name, value.clone())
                .with_context(|| format!("setting variable '{name}' failed"))?;
        }
        ctx.debug(|| {
            format!(
                "Imported {} keyword(s) and {} variable(s).",
                self.keywords.len(),
                self.variables.len()
            )
        });
        Ok(())
    }

    pub fn run_tests(&self, ctx: &mut Context) -> Vec<TestResult> {
        self.tests.iter().map(|test| test.run(ctx)).collect()
    }
}

pub fn parse_steps(value: &Value) -> Result<Vec<Step>> {
    serde_json::from_value(value.clone()).map_err(|err| anyhow!("invalid steps: {err}"))
}

pub fn parse_steps_yaml(text: &str) -> Result<Vec<Step>> {
    let value: Value = serde_yaml::from_str(text).context("invalid YAML steps")?;
    parse_steps(&value)
}
