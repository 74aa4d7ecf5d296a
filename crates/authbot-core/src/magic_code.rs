//! One-time magic codes.
//!
//! A code is 4 bytes from the system CSPRNG rendered as 8 lowercase hex
//! characters. What the user types is normalized with [`normalize`] before
//! lookup, so surrounding whitespace and letter case do not matter.

use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{LoginError, LoginResult};

/// Number of random bytes in a code.
pub const CODE_BYTES: usize = 4;

/// Draws magic codes from a secure random source.
pub struct MagicCodeGenerator {
    rng: SystemRandom,
}

impl Default for MagicCodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MagicCodeGenerator {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    pub fn generate(&self) -> LoginResult<String> {
        let mut bytes = [0u8; CODE_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| LoginError::Random)?;
        Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }
}

/// Canonical form of a user-typed code.
pub fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}
