//! Maps check-type identifiers to their plugin implementations.
//!
//! The registry is built once at process start and treated as read-only
//! afterwards. Registering a duplicate type is a startup error, not a
//! runtime condition to recover from.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::{
    dns::DnsCheck, header::HeaderCheck, http::HttpCheck, imap::ImapCheck,
    json_api::JsonApiCheck, keyword::KeywordCheck, ping::PingCheck, pop3::Pop3Check,
    port::PortCheck, redirect::RedirectCheck, response_time::ResponseTimeCheck, smtp::SmtpCheck,
    ssl::SslCheck, tls::TlsCheck, Check,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("check type '{0}' is already registered")]
    Duplicate(String),
    #[error("unknown check type '{0}'")]
    Unknown(String),
}

/// Descriptor of a registered plugin, consumed by the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct CheckDescriptor {
    #[serde(rename = "type")]
    pub check_type: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub config_schema: Value,
}

#[derive(Default)]
pub struct CheckRegistry {
    checks: HashMap<&'static str, Arc<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in protocol plugin.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(HttpCheck))?;
        registry.register(Arc::new(DnsCheck))?;
        registry.register(Arc::new(SslCheck))?;
        registry.register(Arc::new(TlsCheck))?;
        registry.register(Arc::new(PingCheck))?;
        registry.register(Arc::new(PortCheck))?;
        registry.register(Arc::new(KeywordCheck))?;
        registry.register(Arc::new(HeaderCheck))?;
        registry.register(Arc::new(JsonApiCheck))?;
        registry.register(Arc::new(RedirectCheck))?;
        registry.register(Arc::new(ResponseTimeCheck))?;
        registry.register(Arc::new(SmtpCheck))?;
        registry.register(Arc::new(ImapCheck))?;
        registry.register(Arc::new(Pop3Check))?;
        Ok(registry)
    }

    pub fn register(&mut self, check: Arc<dyn Check>) -> Result<(), RegistryError> {
        let check_type = check.check_type();
        if self.checks.contains_key(check_type) {
            return Err(RegistryError::Duplicate(check_type.to_string()));
        }
        self.checks.insert(check_type, check);
        Ok(())
    }

    pub fn is_registered(&self, check_type: &str) -> bool {
        self.checks.contains_key(check_type)
    }

    pub fn get(&self, check_type: &str) -> Result<Arc<dyn Check>, RegistryError> {
        self.checks
            .get(check_type)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(check_type.to_string()))
    }

    pub fn list(&self) -> Vec<CheckDescriptor> {
        let mut descriptors: Vec<CheckDescriptor> = self
            .checks
            .values()
            .map(|check| CheckDescriptor {
                check_type: check.check_type(),
                display_name: check.display_name(),
                description: check.description(),
                config_schema: check.config_schema(),
            })
            .collect();
        descriptors.sort_by_key(|d| d.check_type);
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registers_all_protocols() {
        let registry = CheckRegistry::builtin().unwrap();
        for check_type in [
            "http", "dns", "ssl", "tls", "ping", "port", "keyword", "header", "json_api",
            "redirect", "response_time", "smtp", "imap", "pop3",
        ] {
            assert!(registry.is_registered(check_type), "{check_type} missing");
        }
        assert_eq!(registry.list().len(), 14);
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut registry = CheckRegistry::builtin().unwrap();
        let err = registry.register(Arc::new(HttpCheck)).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(t) if t == "http"));
    }

    #[test]
    fn unknown_lookup_is_a_client_error() {
        let registry = CheckRegistry::builtin().unwrap();
        let err = registry.get("gopher").err().unwrap();
        assert!(matches!(err, RegistryError::Unknown(t) if t == "gopher"));
    }

    #[test]
    fn descriptors_expose_schemas() {
        let registry = CheckRegistry::builtin().unwrap();
        for descriptor in registry.list() {
            assert!(!descriptor.display_name.is_empty());
            assert!(descriptor.config_schema.get("properties").is_some());
        }
    }
}
