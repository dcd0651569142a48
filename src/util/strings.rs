use anyhow::Result;
use rand::{distr::Alphanumeric, Rng};

/// Random identifier/credential generation.
///
/// The prefix survives into the generated value so credentials stay
/// recognizable in logs and state dumps (`user-…`, `p-…`).
pub trait StringGenerator: Send + Sync {
    fn generate(&self, prefix: &str, length: usize) -> Result<String>;
}

pub struct RandStringGenerator;

impl StringGenerator for RandStringGenerator {
    fn generate(&self, prefix: &str, length: usize) -> Result<String> {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        Ok(format!("{prefix}{suffix}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_strings_carry_prefix_and_length() {
        let gen = RandStringGenerator;
        let value = gen.generate("user-", 15).unwrap();
        assert!(value.starts_with("user-"));
        assert_eq!(value.len(), "user-".len() + 15);
    }

    #[test]
    fn successive_values_differ() {
        let gen = RandStringGenerator;
        let a = gen.generate("p-", 15).unwrap();
        let b = gen.generate("p-", 15).unwrap();
        assert_ne!(a, b);
    }
}
