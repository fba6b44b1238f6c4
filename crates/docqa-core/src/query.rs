use std::fmt;

use crate::error::QueryError;
use crate::prompt::{Message, Role};

/// The text a call is about: the content of the last user-authored message.
///
/// Always non-blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query(String);

impl Query {
    pub fn new(text: impl Into<String>) -> Result<Self, QueryError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QueryError::EmptyText);
        }
        Ok(Self(text))
    }

    /// Extract the query from a prompt. Fails instead of defaulting to an
    /// empty string when the prompt has no usable user text.
    pub fn from_prompt(prompt: &[Message]) -> Result<Self, QueryError> {
        let last_user = prompt
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or(QueryError::NoUserMessage)?;
        let text = last_user.text().ok_or(QueryError::UnsupportedContent)?;
        Self::new(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Query {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
