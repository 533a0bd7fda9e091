//! Indexed descriptor pool shared by the views built from it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use prost::Message;

use crate::contract::{MethodDescriptor, MethodKind, ServiceContract};
use crate::proto::{self, DescriptorProto, FileDescriptorSet, MethodDescriptorProto};
use crate::{DescriptorError, Result, normalize_type_name};

/// Type of a message field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Uint32,
    Bool,
    String,
    Bytes,
    /// A nested message, by fully-qualified name.
    Message(String),
    /// An enum, by fully-qualified name.
    Enum(String),
    /// A wire type this crate does not model (groups).
    Other(i32),
}

impl FieldKind {
    fn from_proto(field_type: i32, type_name: &str) -> Self {
        match field_type {
            1 => Self::Double,
            2 => Self::Float,
            3 | 16 | 18 => Self::Int64,
            4 | 6 => Self::Uint64,
            5 | 15 | 17 => Self::Int32,
            7 | 13 => Self::Uint32,
            8 => Self::Bool,
            9 => Self::String,
            11 => Self::Message(normalize_type_name(type_name).to_string()),
            12 => Self::Bytes,
            14 => Self::Enum(normalize_type_name(type_name).to_string()),
            other => Self::Other(other),
        }
    }
}

/// A single field of a message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Name of the field in the JSON mapping (`lowerCamelCase`).
    pub json_name: String,
    pub number: i32,
    pub kind: FieldKind,
    pub repeated: bool,
}

/// A resolved message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    full_name: String,
    file: String,
    fields: Vec<FieldDescriptor>,
    map_entry: bool,
}

impl MessageDescriptor {
    /// Fully-qualified name without the leading dot.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Last segment of the fully-qualified name.
    pub fn name(&self) -> &str {
        self.full_name.rsplit('.').next().unwrap_or(&self.full_name)
    }

    /// Name of the `.proto` file that declared this message.
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by the key it appears under in a JSON object. Both
    /// the JSON name and the original field name are accepted.
    pub fn json_field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.json_name == key || f.name == key)
    }

    /// Returns true for the synthesized entry type of a `map<K, V>` field.
    pub fn is_map_entry(&self) -> bool {
        self.map_entry
    }
}

/// JSON name protoc derives for a field: underscores dropped, the letter
/// after each one upper-cased.
pub(crate) fn json_name(field_name: &str) -> String {
    let mut out = String::with_capacity(field_name.len());
    let mut upper = false;
    for c in field_name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone)]
struct ServiceEntry {
    methods: Vec<MethodDescriptorProto>,
}

/// Every message and service from a set of descriptor files.
///
/// A pool is immutable once built and is meant to be shared behind an
/// [`Arc`]: several views defined over the same descriptor files can hold the
/// same pool without any process-wide cache.
#[derive(Debug, Default)]
pub struct DescriptorPool {
    messages: HashMap<String, MessageDescriptor>,
    services: HashMap<String, ServiceEntry>,
    files: Vec<String>,
}

impl DescriptorPool {
    /// Decodes a binary `FileDescriptorSet` into a pool.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let set = FileDescriptorSet::decode(bytes)?;
        Ok(Self::from_sets([set]))
    }

    /// Builds a pool from already-decoded descriptor sets.
    ///
    /// Files that appear in more than one set (shared imports) are indexed
    /// once; the first occurrence wins.
    pub fn from_sets(sets: impl IntoIterator<Item = FileDescriptorSet>) -> Self {
        let mut pool = Self::default();
        let mut seen = HashSet::new();

        for file in sets.into_iter().flat_map(|set| set.file) {
            if !seen.insert(file.name.clone()) {
                tracing::debug!(file = %file.name, "skipping duplicate descriptor file");
                continue;
            }

            let prefix = file.package.clone();
            for message in &file.message_type {
                pool.index_message(&file.name, &prefix, message);
            }
            for service in file.service {
                let full_name = qualify(&prefix, &service.name);
                pool.services.insert(
                    full_name,
                    ServiceEntry {
                        methods: service.method,
                    },
                );
            }
            pool.files.push(file.name);
        }

        tracing::debug!(
            files = pool.files.len(),
            messages = pool.messages.len(),
            services = pool.services.len(),
            "descriptor pool built"
        );
        pool
    }

    fn index_message(&mut self, file: &str, prefix: &str, message: &DescriptorProto) {
        let full_name = qualify(prefix, &message.name);
        for nested in &message.nested_type {
            self.index_message(file, &full_name, nested);
        }

        let fields = message
            .field
            .iter()
            .map(|f| FieldDescriptor {
                name: f.name.clone(),
                json_name: if f.json_name.is_empty() {
                    json_name(&f.name)
                } else {
                    f.json_name.clone()
                },
                number: f.number,
                kind: FieldKind::from_proto(f.field_type, &f.type_name),
                repeated: f.label == proto::LABEL_REPEATED,
            })
            .collect();

        self.messages
            .entry(full_name.clone())
            .or_insert(MessageDescriptor {
                full_name,
                file: file.to_string(),
                fields,
                map_entry: message.options.as_ref().is_some_and(|o| o.map_entry),
            });
    }

    /// Looks up a message type by fully-qualified name (leading dot optional).
    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.get(normalize_type_name(name))
    }

    /// Returns true if a service with this fully-qualified name exists.
    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(normalize_type_name(name))
    }

    /// Names of the descriptor files indexed by this pool.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Resolves a service into a contract.
    ///
    /// Fails if the service is unknown or if any method refers to a message
    /// type missing from the pool.
    pub fn resolve_service(self: &Arc<Self>, service_name: &str) -> Result<ServiceContract> {
        let service_name = normalize_type_name(service_name);
        let entry = self
            .services
            .get(service_name)
            .ok_or_else(|| DescriptorError::UnknownService(service_name.to_string()))?;

        let mut methods = Vec::with_capacity(entry.methods.len());
        for method in &entry.methods {
            let input_type = normalize_type_name(&method.input_type);
            let output_type = normalize_type_name(&method.output_type);
            for type_name in [input_type, output_type] {
                if !self.messages.contains_key(type_name) {
                    return Err(DescriptorError::UnresolvedType {
                        service: service_name.to_string(),
                        method: method.name.clone(),
                        type_name: type_name.to_string(),
                    });
                }
            }

            methods.push(MethodDescriptor {
                name: method.name.clone(),
                input_type: input_type.to_string(),
                output_type: output_type.to_string(),
                kind: MethodKind::from_options(method.options.as_ref()),
            });
        }

        Ok(ServiceContract::new(
            Arc::clone(self),
            service_name.to_string(),
            methods,
        ))
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
