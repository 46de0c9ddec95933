//! Operation policy enforcement.
//!
//! Descriptors declare the side-effecting operations they use. The policy
//! holds the operations the deployment forbids and rejects any descriptor
//! that declares one of them. The resolver applies it to whole dependency
//! closures before budgeting.

use std::collections::BTreeSet;

use capsmith_types::config::OperationPolicyConfig;
use capsmith_types::descriptor::{Descriptor, Operation};

/// A descriptor declared a denied operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation {operation} denied for descriptor '{descriptor}'")]
pub struct PolicyViolation {
    pub descriptor: String,
    pub operation: Operation,
}

/// Set of operations no activated descriptor may use.
///
/// The default policy denies nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationPolicy {
    denied: BTreeSet<Operation>,
}

impl OperationPolicy {
    pub fn new(denied: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }

    pub fn from_config(config: &OperationPolicyConfig) -> Self {
        Self::new(config.denied_operations.iter().copied())
    }

    pub fn is_denied(&self, operation: Operation) -> bool {
        self.denied.contains(&operation)
    }

    pub fn denied_operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.denied.iter().copied()
    }

    /// Check one descriptor.
    ///
    /// Reports the first denied operation in declaration order.
    pub fn check(&self, descriptor: &Descriptor) -> Result<(), PolicyViolation> {
        match descriptor
            .allowed_operations
            .iter()
            .find(|op| self.denied.contains(op))
        {
            Some(&operation) => Err(PolicyViolation {
                descriptor: descriptor.id.clone(),
                operation,
            }),
            None => Ok(()),
        }
    }

    /// Check every descriptor in `descriptors`, short-circuiting on the first
    /// violation.
    pub fn check_all<'a>(
        &self,
        descriptors: impl IntoIterator<Item = &'a Descriptor>,
    ) -> Result<(), PolicyViolation> {
        if self.denied.is_empty() {
            return Ok(());
        }
        for descriptor in descriptors {
            self.check(descriptor)?;
        }
        Ok(())
    }
}
