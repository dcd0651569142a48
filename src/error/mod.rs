//! Error values shared across the provisioning workflow.
//!
//! Most failures propagate verbatim through `anyhow`; the types here exist
//! where the rendered message is part of the observable contract.

use std::fmt;

/// Aggregates failures from independent subsystems into one diagnosable
/// error, preserving the order in which they occurred.
///
/// The infrastructure-apply checkpoint is the one place two failures can
/// coincide: the terraform apply itself and the state write that must
/// happen regardless. Both messages are surfaced together.
#[derive(Debug)]
pub struct Errors {
    errors: Vec<anyhow::Error>,
}

impl Errors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn push(&mut self, err: anyhow::Error) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Collapse into a single `anyhow::Error`.
    ///
    /// A single entry is returned untouched so callers see the original
    /// message; two or more render in the aggregate format.
    pub fn into_result(mut self) -> Result<(), anyhow::Error> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(anyhow::Error::new(self)),
        }
    }
}

impl Default for Errors {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the following errors occurred:")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i == 0 {
                write!(f, "\n{err}")?;
            } else {
                write!(f, ",\n{err}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}
