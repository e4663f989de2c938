//! Generation tokens.
//!
//! Every async load captures the token current at its start. Results are only
//! committed while that token is still current; tasks of a superseded generation
//! run to completion and their output is dropped.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadToken(u64);

impl fmt::Display for LoadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena-style counter minting one token per score source.
#[derive(Debug, Default)]
pub struct Generation {
    counter: u64,
    current: Option<LoadToken>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation; every older token becomes stale.
    pub fn advance(&mut self) -> LoadToken {
        self.counter += 1;
        let token = LoadToken(self.counter);
        self.current = Some(token);
        token
    }

    pub fn current(&self) -> Option<LoadToken> {
        self.current
    }

    pub fn is_current(&self, token: LoadToken) -> bool {
        self.current == Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_distinct_and_supersede() {
        let mut generation = Generation::new();
        assert_eq!(generation.current(), None);

        let first = generation.advance();
        assert!(generation.is_current(first));

        let second = generation.advance();
        assert_ne!(first, second);
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
    }
}
