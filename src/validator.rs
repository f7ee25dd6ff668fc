//! Field-keyed validation accumulator.
//!
//! A [`Validator`] is created per request, fed with checks, and turned into an
//! [`AppError::FailedValidation`] when any check failed. The first message
//! recorded for a field wins; later failures on the same field are ignored.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AppError, AppResult};

#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn add(&mut self, field: &str, message: &str) {
        if !self.has(field) {
            self.errors.insert(field.to_string(), message.to_string());
        }
    }

    /// Records `message` under `field` when `failed` is true.
    pub fn check(&mut self, failed: bool, field: &str, message: &str) {
        if failed {
            self.add(field, message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn into_errors(self) -> BTreeMap<String, String> {
        self.errors
    }

    /// `Ok(())` when valid, otherwise a 422 carrying the error map.
    pub fn finish(self) -> AppResult<()> {
        if self.valid() {
            Ok(())
        } else {
            Err(AppError::FailedValidation(self.errors))
        }
    }
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

pub fn matches_email(value: &str) -> bool {
    static EMAIL_RX: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RX
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|rx| rx.is_match(value))
}
