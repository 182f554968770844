//! # Usernames
//!
//! Human-readable handles mapped to account addresses. A handle is 1 to 63
//! characters of lowercase ASCII letters, digits and hyphens, never starts or
//! ends with a hyphen, and is not one of the reserved words.
//!
//! Each address owns at most one handle, so lookups work both ways.

use crate::check_address;
use crate::error::{ServiceError, ServiceResult};
use etrid_core::AccountId;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

pub const MAX_USERNAME_LEN: usize = 63;

static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "admin", "administrator", "root", "system", "support", "help", "etrid", "etr",
        "wallet", "official", "null", "undefined", "treasury", "foundation", "validator",
        "bridge", "api", "www",
    ]
    .into_iter()
    .collect()
});

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(name)
}

/// Reject handles that break the naming rules
pub fn validate_username(name: &str) -> ServiceResult<()> {
    if name.is_empty() || name.len() > MAX_USERNAME_LEN {
        return Err(ServiceError::invalid(format!(
            "Username must be 1-{MAX_USERNAME_LEN} characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(ServiceError::invalid(
            "Username may only contain lowercase letters, digits and hyphens",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(ServiceError::invalid("Username cannot start or end with a hyphen"));
    }
    if is_reserved(name) {
        return Err(ServiceError::invalid(format!("Username '{name}' is reserved")));
    }
    Ok(())
}

/// Accept `@alice` as well as `alice`
pub fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('@').to_ascii_lowercase()
}

#[derive(Debug, Default)]
pub struct UsernameRegistry {
    by_name: HashMap<String, AccountId>,
    by_address: HashMap<AccountId, String>,
}

impl UsernameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self, name: &str) -> bool {
        let name = normalize(name);
        validate_username(&name).is_ok() && !self.by_name.contains_key(&name)
    }

    /// Claim `name` for `address`, replacing any handle the address held
    pub fn register(&mut self, name: &str, address: &str) -> ServiceResult<String> {
        let name = normalize(name);
        validate_username(&name)?;
        check_address(address)?;
        match self.by_name.get(&name) {
            Some(owner) if owner == address => return Ok(name),
            Some(_) => return Err(ServiceError::AlreadyExists(format!("Username '{name}'"))),
            None => {}
        }
        if let Some(previous) = self.by_address.insert(address.to_string(), name.clone()) {
            self.by_name.remove(&previous);
        }
        self.by_name.insert(name.clone(), address.to_string());
        tracing::debug!(username = %name, address, "Username registered");
        Ok(name)
    }

    pub fn resolve(&self, name: &str) -> Option<&AccountId> {
        self.by_name.get(&normalize(name))
    }

    pub fn reverse_resolve(&self, address: &str) -> Option<&str> {
        self.by_address.get(address).map(String::as_str)
    }

    /// Give up the handle; only its owner may do so
    pub fn release(&mut self, name: &str, address: &str) -> ServiceResult<()> {
        let name = normalize(name);
        match self.by_name.get(&name) {
            None => Err(ServiceError::NotFound("Username")),
            Some(owner) if owner != address => Err(ServiceError::NotPermitted(
                "Only the owner can release a username".into(),
            )),
            Some(_) => {
                self.by_name.remove(&name);
                self.by_address.remove(address);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
