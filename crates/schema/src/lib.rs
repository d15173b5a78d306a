//! Schema and type metadata lookup.
//!
//! Resolves OData-style type identifiers (`#ManagerAccount.v1_2_0.ManagerAccount`)
//! against a locally cached corpus of JSON schema bundles. Schema availability
//! is best-effort: an unresolvable identifier is `None`, never an error, and
//! rules treat an absent schema as WARN/INCOMPLETE rather than FAIL.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading the schema corpus from disk.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("IO error reading schema corpus: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema bundle {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// One property of a schema type, with its annotation terms.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, Value>,
}

impl PropertyDescriptor {
    /// Value of an annotation term, if the property carries it.
    pub fn annotation(&self, term: &str) -> Option<&Value> {
        self.annotations.get(term)
    }

    /// True when the property is annotated read-only
    /// (`OData.Permissions` = `OData.Permission/Read`).
    pub fn is_read_only(&self) -> bool {
        self.annotation("OData.Permissions")
            .and_then(Value::as_str)
            .map(|p| p == "OData.Permission/Read")
            .unwrap_or(false)
    }
}

/// A named type: its ordered property list and optional base type.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    #[serde(default)]
    pub base_type: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl TypeDescriptor {
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// True when the payload key is declared here. OData control keys
    /// (`@odata.*`, `*@odata.*`) are always considered declared.
    pub fn declares(&self, key: &str) -> bool {
        key.contains('@') || self.property(key).is_some()
    }
}

/// A schema namespace, e.g. `ManagerAccount.v1_2_0`.
#[derive(Debug, Clone, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub types: Vec<TypeDescriptor>,
}

impl Namespace {
    /// Unversioned part of the namespace name.
    pub fn base_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}

/// On-disk bundle format: one file holds one or more namespaces.
#[derive(Debug, Deserialize)]
struct SchemaBundle {
    namespaces: Vec<Namespace>,
}

/// Parsed form of a type identifier.
#[derive(Debug, PartialEq, Eq)]
pub struct TypeIdentifier<'a> {
    /// Full (usually versioned) namespace, e.g. `ManagerAccount.v1_2_0`.
    pub namespace: &'a str,
    /// Unversioned namespace, e.g. `ManagerAccount`.
    pub base_namespace: &'a str,
    /// Bare type name, e.g. `ManagerAccount`.
    pub type_name: &'a str,
}

/// Splits `#Namespace.vX_Y_Z.Type` into its parts. Returns `None` for
/// identifiers without at least a namespace and a type segment.
pub fn parse_type_identifier(ident: &str) -> Option<TypeIdentifier<'_>> {
    let ident = ident.strip_prefix('#').unwrap_or(ident);
    let (namespace, type_name) = ident.rsplit_once('.')?;
    if namespace.is_empty() || type_name.is_empty() {
        return None;
    }
    let base_namespace = namespace.split('.').next().unwrap_or(namespace);
    Some(TypeIdentifier {
        namespace,
        base_namespace,
        type_name,
    })
}

/// Indexed schema corpus.
#[derive(Debug, Default)]
pub struct SchemaIndex {
    namespaces: BTreeMap<String, Namespace>,
}

impl SchemaIndex {
    /// An index with no schemas; every lookup resolves to absent.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every `*.json` bundle in a directory.
    pub fn load_dir(dir: &Path) -> SchemaResult<Self> {
        let mut index = Self::default();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            let bundle: SchemaBundle =
                serde_json::from_str(&contents).map_err(|source| SchemaError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            for namespace in bundle.namespaces {
                index.insert(namespace);
            }
        }
        tracing::info!(namespaces = index.namespaces.len(), "schema corpus loaded");
        Ok(index)
    }

    pub fn insert(&mut self, namespace: Namespace) {
        self.namespaces.insert(namespace.name.clone(), namespace);
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Resolves a type identifier to its namespace and descriptor.
    ///
    /// Tries the exact versioned namespace first, then any namespace with the
    /// same unversioned base name that declares the type.
    pub fn resolve_type(&self, ident: &str) -> Option<(&Namespace, &TypeDescriptor)> {
        let parsed = parse_type_identifier(ident)?;

        if let Some(namespace) = self.namespaces.get(parsed.namespace) {
            if let Some(ty) = namespace.types.iter().find(|t| t.name == parsed.type_name) {
                return Some((namespace, ty));
            }
        }

        self.namespaces
            .values()
            .filter(|ns| ns.base_name() == parsed.base_namespace)
            .find_map(|ns| {
                ns.types
                    .iter()
                    .find(|t| t.name == parsed.type_name)
                    .map(|t| (ns, t))
            })
    }
}
