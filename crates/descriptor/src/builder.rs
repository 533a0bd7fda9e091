//! In-code construction of descriptor sets.
//!
//! Produces the same [`proto`](crate::proto) messages protoc would emit, so
//! views can be defined without a compiled `.desc` file on disk.

use prost::Message;

use crate::pool::json_name;
use crate::proto::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet, LABEL_REPEATED,
    MessageOptions, MethodDescriptorProto, MethodOptions, QueryOptions, ServiceDescriptorProto,
    UpdateOptions, ViewMethodOptions,
};

const TYPE_INT32: i32 = 5;
const TYPE_INT64: i32 = 3;
const TYPE_BOOL: i32 = 8;
const TYPE_STRING: i32 = 9;
const TYPE_MESSAGE: i32 = 11;
const TYPE_UINT32: i32 = 13;
const LABEL_OPTIONAL: i32 = 1;

/// Builds one `.proto` file.
#[derive(Debug, Clone)]
pub struct FileBuilder {
    file: FileDescriptorProto,
}

impl FileBuilder {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            file: FileDescriptorProto {
                name: name.into(),
                package: package.into(),
                ..Default::default()
            },
        }
    }

    /// Adds a top-level message.
    pub fn message(mut self, name: &str, build: impl FnOnce(MessageBuilder) -> MessageBuilder) -> Self {
        let full_name = if self.file.package.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.file.package)
        };
        self.file.message_type.push(build(MessageBuilder::new(name, full_name)).message);
        self
    }

    /// Adds a service.
    pub fn service(mut self, name: &str, build: impl FnOnce(ServiceBuilder) -> ServiceBuilder) -> Self {
        let builder = build(ServiceBuilder::new(name, &self.file.package));
        self.file.service.push(builder.service);
        self
    }

    pub fn into_proto(self) -> FileDescriptorProto {
        self.file
    }

    /// Wraps this file in a single-file descriptor set.
    pub fn into_set(self) -> FileDescriptorSet {
        FileDescriptorSet {
            file: vec![self.file],
        }
    }

    /// Encodes this file as a binary descriptor set.
    pub fn encode(self) -> Vec<u8> {
        self.into_set().encode_to_vec()
    }
}

/// Builds a message type.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: DescriptorProto,
    full_name: String,
}

impl MessageBuilder {
    fn new(name: &str, full_name: String) -> Self {
        Self {
            message: DescriptorProto {
                name: name.to_string(),
                ..Default::default()
            },
            full_name,
        }
    }

    fn field(mut self, name: &str, field_type: i32, label: i32, type_name: &str) -> Self {
        let number = self.message.field.len() as i32 + 1;
        self.message.field.push(FieldDescriptorProto {
            name: name.to_string(),
            number,
            label,
            field_type,
            type_name: type_name.to_string(),
            json_name: json_name(name),
        });
        self
    }

    pub fn string(self, name: &str) -> Self {
        self.field(name, TYPE_STRING, LABEL_OPTIONAL, "")
    }

    pub fn repeated_string(self, name: &str) -> Self {
        self.field(name, TYPE_STRING, LABEL_REPEATED, "")
    }

    pub fn int32(self, name: &str) -> Self {
        self.field(name, TYPE_INT32, LABEL_OPTIONAL, "")
    }

    pub fn int64(self, name: &str) -> Self {
        self.field(name, TYPE_INT64, LABEL_OPTIONAL, "")
    }

    pub fn uint32(self, name: &str) -> Self {
        self.field(name, TYPE_UINT32, LABEL_OPTIONAL, "")
    }

    pub fn bool(self, name: &str) -> Self {
        self.field(name, TYPE_BOOL, LABEL_OPTIONAL, "")
    }

    /// A message-typed field; `type_name` is fully qualified.
    pub fn message(self, name: &str, type_name: &str) -> Self {
        self.field(name, TYPE_MESSAGE, LABEL_OPTIONAL, &format!(".{type_name}"))
    }

    pub fn repeated_message(self, name: &str, type_name: &str) -> Self {
        self.field(name, TYPE_MESSAGE, LABEL_REPEATED, &format!(".{type_name}"))
    }

    /// A `map<string, string>` field, with its entry type nested the way
    /// protoc synthesizes it.
    pub fn string_map(mut self, name: &str) -> Self {
        let mut entry_name = json_name(name);
        if let Some(first) = entry_name.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        entry_name.push_str("Entry");

        let mut entry = MessageBuilder::new(&entry_name, format!("{}.{entry_name}", self.full_name))
            .string("key")
            .string("value")
            .message;
        entry.options = Some(MessageOptions { map_entry: true });
        self.message.nested_type.push(entry);

        let type_name = format!(".{}.{entry_name}", self.full_name);
        self.field(name, TYPE_MESSAGE, LABEL_REPEATED, &type_name)
    }

    pub fn nested(mut self, name: &str, build: impl FnOnce(MessageBuilder) -> MessageBuilder) -> Self {
        let full_name = format!("{}.{name}", self.full_name);
        self.message.nested_type.push(build(MessageBuilder::new(name, full_name)).message);
        self
    }
}

/// Builds a service. Type names given to the method helpers are relative to
/// the file's package.
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    service: ServiceDescriptorProto,
    package: String,
}

impl ServiceBuilder {
    fn new(name: &str, package: &str) -> Self {
        Self {
            service: ServiceDescriptorProto {
                name: name.to_string(),
                method: Vec::new(),
            },
            package: package.to_string(),
        }
    }

    fn qualify(&self, type_name: &str) -> String {
        if self.package.is_empty() {
            format!(".{type_name}")
        } else {
            format!(".{}.{type_name}", self.package)
        }
    }

    fn method(mut self, name: &str, input: &str, output: &str, view: Option<ViewMethodOptions>) -> Self {
        let method = MethodDescriptorProto {
            name: name.to_string(),
            input_type: self.qualify(input),
            output_type: self.qualify(output),
            options: view.map(|view| MethodOptions { view: Some(view) }),
        };
        self.service.method.push(method);
        self
    }

    /// An update method whose events are folded by a user handler.
    pub fn transform_update(self, name: &str, input: &str, output: &str, table: &str) -> Self {
        self.method(name, input, output, Some(update_options(table, true)))
    }

    /// An update method that stores events without a handler.
    pub fn update(self, name: &str, input: &str, output: &str, table: &str) -> Self {
        self.method(name, input, output, Some(update_options(table, false)))
    }

    pub fn query(self, name: &str, input: &str, output: &str, query: &str) -> Self {
        let view = ViewMethodOptions {
            update: None,
            query: Some(QueryOptions {
                query: query.to_string(),
            }),
        };
        self.method(name, input, output, Some(view))
    }

    /// A method without view options.
    pub fn plain(self, name: &str, input: &str, output: &str) -> Self {
        self.method(name, input, output, None)
    }
}

fn update_options(table: &str, transform_updates: bool) -> ViewMethodOptions {
    ViewMethodOptions {
        update: Some(UpdateOptions {
            table: table.to_string(),
            transform_updates,
        }),
        query: None,
    }
}
