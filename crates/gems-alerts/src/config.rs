//! Compiler configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::route::DEFAULT_MAX_ROUTE_DEPTH;
use crate::template::TemplateRegistry;

/// Settings shared by forward and reverse compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Deepest routing level resolution may descend to.
    pub max_route_depth: usize,
    /// Whether stored expressions are checked against their templates.
    pub verify_expressions: bool,
    /// Effective template registry.
    pub templates: TemplateRegistry,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_route_depth: DEFAULT_MAX_ROUTE_DEPTH,
            verify_expressions: true,
            templates: TemplateRegistry::default(),
        }
    }
}

/// File form of [`CompilerOptions`]; every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Deepest routing level resolution may descend to.
    pub max_route_depth: usize,
    /// Whether stored expressions are checked against their templates.
    pub verify_expressions: bool,
    /// Templates added to (or replacing entries of) the default registry.
    pub extra_templates: TemplateRegistry,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_route_depth: DEFAULT_MAX_ROUTE_DEPTH,
            verify_expressions: true,
            extra_templates: TemplateRegistry::empty(),
        }
    }
}

impl CompilerConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Serialization` if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolves the config into options.
    #[must_use]
    pub fn into_options(self) -> CompilerOptions {
        let mut templates = TemplateRegistry::default();
        templates.merge(&self.extra_templates);
        CompilerOptions {
            max_route_depth: self.max_route_depth,
            verify_expressions: self.verify_expressions,
            templates,
        }
    }
}
