//! Build and platform environment a load or save runs under.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Decides which capability-restricted properties are present.
///
/// Deserializes from JSON with every field optional:
/// `{"editor": false, "console": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Editor data is present in this build.
    pub editor: bool,
    /// Running on or targeting a stripped console platform.
    pub console: bool,
    /// Editor-only properties and script regions are filtered out.
    pub filter_editor_only: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An editor build on a non-console platform.
    pub fn new() -> Self {
        Self {
            editor: true,
            console: false,
            filter_editor_only: false,
        }
    }

    pub fn editor(mut self, on: bool) -> Self {
        self.editor = on;
        self
    }

    pub fn console(mut self, on: bool) -> Self {
        self.console = on;
        self
    }

    pub fn filter_editor_only(mut self, on: bool) -> Self {
        self.filter_editor_only = on;
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Editor-only values are kept when loading.
    #[inline]
    pub fn loads_editor_only(&self) -> bool {
        self.editor && !self.console
    }
}
