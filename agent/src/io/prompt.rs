//! System instruction rendering.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// Action names advertised to the model, in the order the prompt lists them.
pub const ACTIONS: [&str; 4] = ["run", "write", "read", "done"];

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        Ok(Self { env })
    }

    /// Render the fixed system instruction that opens every conversation.
    pub fn system_instruction(&self) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template
            .render(context! { actions => ACTIONS })
            .context("render system template")?;
        Ok(rendered)
    }
}

/// Convenience for callers that only need the rendered system instruction.
pub fn system_instruction() -> Result<String> {
    PromptEngine::new()?.system_instruction()
}
