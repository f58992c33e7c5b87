//! Endpoint fingerprints
//!
//! A [`Fingerprint`] is the dedup key of the pool: two endpoints with equal
//! fingerprints are interchangeable, so the pool only ever keeps one.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// A configuration argument that affects how an endpoint connects
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArgValue {
    /// Integer argument (timeouts, window sizes, flags)
    Int(i64),
    /// String argument (authority override, user agent)
    Str(String),
    /// Opaque argument compared by content (credentials digest, TLS config)
    Bytes(Bytes),
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl From<Bytes> for ArgValue {
    fn from(v: Bytes) -> Self {
        ArgValue::Bytes(v)
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{}", v),
            ArgValue::Str(v) => write!(f, "{:?}", v),
            ArgValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Canonical identity of a pooled endpoint (target address + arguments)
///
/// Ordering compares the address first, then the arguments in key order.
/// Arguments are kept sorted, so insertion order never affects identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint {
    address: String,
    args: BTreeMap<String, ArgValue>,
}

impl Fingerprint {
    /// Create a fingerprint for a target address with no arguments
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: BTreeMap::new(),
        }
    }

    /// Add an argument, replacing any previous value with the same name
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Target address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Look up an argument by name
    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }

    /// Iterate the arguments in name order
    pub fn args(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        if !self.args.is_empty() {
            f.write_str("{")?;
            for (i, (name, value)) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}={}", name, value)?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}
