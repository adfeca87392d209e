//! Signal registry - the declared catalog of signals the bridge may observe
//!
//! Configuration validation resolves signal references and field kinds
//! against this registry before any definition reaches the correlation
//! engine or the metric/log mappers.

use crate::signal::FieldKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared shape of one signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSpec {
    /// Stable signal name
    pub name: String,

    /// Display name for UIs and span naming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Declared fields
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl SignalSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
        });
        self
    }

    /// Look up a declared field's kind
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }
}

/// Declared shape of one field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field key name
    pub name: String,

    /// Field type
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

/// Catalog of declared signals, indexed by name
#[derive(Debug, Clone, Default)]
pub struct SignalRegistry {
    signals: HashMap<String, SignalSpec>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of specs; later duplicates win
    pub fn from_specs(specs: impl IntoIterator<Item = SignalSpec>) -> Self {
        Self {
            signals: specs
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
        }
    }

    /// Register a signal spec
    pub fn register(&mut self, spec: SignalSpec) {
        self.signals.insert(spec.name.clone(), spec);
    }

    /// Look up a signal spec by name
    pub fn get(&self, name: &str) -> Option<&SignalSpec> {
        self.signals.get(name)
    }

    /// Whether the signal is declared
    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
