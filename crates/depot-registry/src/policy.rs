use depot_resource::MirrorList;

use crate::{RegistryError, Result};

/// Smallest attempt budget handed out by [`RetryPolicy::default_for`].
pub const MIN_ATTEMPTS: u32 = 5;

/// How many attempts a fetch gets before the registry gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(RegistryError::InvalidPolicy);
        }
        Ok(Self { max_attempts })
    }

    /// At least [`MIN_ATTEMPTS`], and never fewer than one per mirror so each
    /// mirror gets its turn.
    pub fn default_for(mirrors: &MirrorList) -> Self {
        let mirrors = u32::try_from(mirrors.len()).unwrap_or(u32::MAX);
        Self {
            max_attempts: mirrors.max(MIN_ATTEMPTS),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn is_last(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(RetryPolicy::new(0), Err(RegistryError::InvalidPolicy)));
        assert_eq!(RetryPolicy::new(1).unwrap().max_attempts(), 1);
    }

    #[test]
    fn test_default_covers_every_mirror() {
        let few = MirrorList::parse(["https://a.example.com/", "https://b.example.com/"]).unwrap();
        assert_eq!(RetryPolicy::default_for(&few).max_attempts(), MIN_ATTEMPTS);

        let many = MirrorList::parse((0..9).map(|i| format!("https://m{i}.example.com/"))).unwrap();
        assert_eq!(RetryPolicy::default_for(&many).max_attempts(), 9);
    }

    #[test]
    fn test_is_last() {
        let policy = RetryPolicy::new(3).unwrap();
        assert!(!policy.is_last(0));
        assert!(!policy.is_last(1));
        assert!(policy.is_last(2));
    }
}
