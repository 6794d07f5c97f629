use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AppResult;
use crate::git::Repository;

/// File in which Cookiecutter records the answers used to render an instance.
pub const CONTEXT_FILE: &str = ".cookiecutter.json";

/// Template variables of an instance, in the order they appear in `.cookiecutter.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn from_slice(data: &[u8]) -> AppResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Load the context from the tree at `revision`.
    #[tracing::instrument(level = "debug")]
    pub fn load(repository: &Repository, revision: &str) -> AppResult<Self> {
        let data = repository.read_file(revision, Path::new(CONTEXT_FILE))?;
        Self::from_slice(&data)
    }

    /// Variables with string values. Lists, choices and nested objects cannot
    /// be recovered from rendered text and are left out.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|value| (key.as_str(), value)))
    }

    /// Where the instance was generated from, as recorded by Cookiecutter.
    pub fn template(&self) -> Option<&str> {
        self.0.get("_template").and_then(Value::as_str)
    }
}
