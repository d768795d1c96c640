use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const ACCOUNT_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountIdError {
    #[error("account id is empty")]
    Empty,
    #[error("account id '{0}' contains non-digit characters")]
    NonDigit(String),
    #[error("account id '{0}' is longer than 12 digits")]
    TooLong(String),
}

/// Cloud account identifier, always held as 12 zero-padded digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// All-zero placeholder used before configuration supplies a real id.
    pub fn unset() -> Self {
        Self("0".repeat(ACCOUNT_ID_LEN))
    }

    pub fn is_unset(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AccountIdError::Empty);
        }
        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(AccountIdError::NonDigit(trimmed.to_string()));
        }
        if trimmed.len() > ACCOUNT_ID_LEN {
            return Err(AccountIdError::TooLong(trimmed.to_string()));
        }
        Ok(Self(format!("{trimmed:0>12}")))
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for AccountId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
