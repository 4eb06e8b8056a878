use crate::error::{Error, Result};

use parking_lot::Mutex;

/// Shared secrets accepted one after another: a successful login moves on to the next one,
/// wrapping around at the end of the list.
#[derive(Debug)]
pub struct AuthRotation {
    passwords: Vec<String>,
    current: Mutex<usize>,
}

impl AuthRotation {
    pub fn new(passwords: Vec<String>) -> Self {
        Self {
            passwords,
            current: Mutex::new(0),
        }
    }

    pub fn check(&self, password: &str) -> Result<()> {
        let mut current = self.current.lock();
        match self.passwords.get(*current) {
            Some(expected) if expected == password => {
                *current = (*current + 1) % self.passwords.len();
                Ok(())
            }
            _ => Err(Error::AuthFailure),
        }
    }
}
