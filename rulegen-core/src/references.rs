//! Reference link validation.
//!
//! Every reference URL of every rule is HEAD-checked through a
//! [`ReferenceChecker`]; anything that does not answer `200` is dropped from
//! the rule. A checker error means the check itself could not run and stops
//! the whole run.

use crate::types::Rule;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::thread;

pub const OK_STATUS: &str = "200";

/// Resolves the HTTP status of a URL.
///
/// Implementations return the status code as text (`"200"`, `"404"`) and an
/// error only for transport failures.
pub trait ReferenceChecker: Sync {
    fn status(&self, url: &str) -> Result<String>;
}

/// URL → last seen status.
///
/// Lookups and inserts take the lock separately, so two workers missing on
/// the same URL at once both run the check. Results are identical either way.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: Mutex<HashMap<String, String>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    pub fn insert(&self, url: &str, status: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), status.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ReferenceValidator<'a> {
    checker: &'a dyn ReferenceChecker,
    cache: StatusCache,
    max_concurrent_checks: usize,
}

impl<'a> ReferenceValidator<'a> {
    pub fn new(checker: &'a dyn ReferenceChecker, max_concurrent_checks: usize) -> Self {
        Self {
            checker,
            cache: StatusCache::new(),
            max_concurrent_checks: max_concurrent_checks.max(1),
        }
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    fn status(&self, url: &str) -> Result<String> {
        if let Some(status) = self.cache.get(url) {
            return Ok(status);
        }
        let status = self.checker.status(url)?;
        self.cache.insert(url, &status);
        Ok(status)
    }

    /// Statuses of `urls` in input order, at most `max_concurrent_checks`
    /// in flight.
    pub fn statuses(&self, urls: &[String]) -> Result<Vec<String>> {
        let mut statuses = Vec::with_capacity(urls.len());
        for batch in urls.chunks(self.max_concurrent_checks) {
            let results: Vec<Result<String>> = thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|url| scope.spawn(move || self.status(url)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|_| Err(anyhow::anyhow!("reference check panicked")))
                    })
                    .collect()
            });
            for result in results {
                statuses.push(result?);
            }
        }
        Ok(statuses)
    }

    /// Keep the references that answer `200`, in order
    pub fn validate(&self, references: &[String]) -> Result<Vec<String>> {
        let statuses = self.statuses(references)?;
        Ok(references
            .iter()
            .zip(statuses)
            .filter_map(|(url, status)| {
                if status == OK_STATUS {
                    Some(url.clone())
                } else {
                    tracing::warn!(url = %url, status = %status, "dropping unreachable reference");
                    None
                }
            })
            .collect())
    }

    pub fn validate_rules(&self, rules: &mut [Rule]) -> Result<()> {
        for rule in rules.iter_mut() {
            let before = rule.references.len();
            rule.references = self.validate(&rule.references)?;
            tracing::debug!(
                rule = %rule.rule_number,
                kept = rule.references.len(),
                dropped = before - rule.references.len(),
                "validated references"
            );
        }
        tracing::info!(checked = self.cache.len(), "reference validation complete");
        Ok(())
    }
}
