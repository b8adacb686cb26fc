use anyhow::Result;
use dialoguer::{Input, Password};

use super::Field;

/// Asks the operator for a value that was not preset.
pub trait Prompter {
    fn ask(&self, field: Field, default: Option<&str>) -> Result<String>;
}

/// Interactive terminal prompts. Secret fields are read without echo.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&self, field: Field, default: Option<&str>) -> Result<String> {
        if field.is_secret() {
            let value = Password::new()
                .with_prompt(field.label())
                .allow_empty_password(true)
                .interact()?;
            return Ok(value);
        }

        let mut input = Input::<String>::new()
            .with_prompt(field.label())
            .allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?)
    }
}

/// Used when stdin is not a terminal: unset fields stay empty.
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn ask(&self, _field: Field, _default: Option<&str>) -> Result<String> {
        Ok(String::new())
    }
}
