//! Wire-level descriptor messages.
//!
//! A subset of `google/protobuf/descriptor.proto`, decoded with prost. Only
//! the fields a view needs are declared; everything else in a descriptor set
//! is skipped as unknown on decode.
//!
//! Method kinds are carried by a custom option on `MethodOptions`:
//!
//! ```proto
//! extend google.protobuf.MethodOptions {
//!   ViewMethodOptions view = 1080;
//! }
//! ```

/// Extension field number of [`ViewMethodOptions`] inside `MethodOptions`.
pub const VIEW_OPTIONS_FIELD: u32 = 1080;

/// `FieldDescriptorProto.Label.LABEL_REPEATED`.
pub const LABEL_REPEATED: i32 = 3;

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileDescriptorSet {
    #[prost(message, repeated, tag = "1")]
    pub file: Vec<FileDescriptorProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileDescriptorProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub package: String,
    #[prost(string, repeated, tag = "3")]
    pub dependency: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub message_type: Vec<DescriptorProto>,
    #[prost(message, repeated, tag = "6")]
    pub service: Vec<ServiceDescriptorProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DescriptorProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub field: Vec<FieldDescriptorProto>,
    #[prost(message, repeated, tag = "3")]
    pub nested_type: Vec<DescriptorProto>,
    #[prost(message, optional, tag = "7")]
    pub options: Option<MessageOptions>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MessageOptions {
    /// Set by protoc on the synthesized entry type of a `map<K, V>` field.
    #[prost(bool, tag = "7")]
    pub map_entry: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FieldDescriptorProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "3")]
    pub number: i32,
    #[prost(int32, tag = "4")]
    pub label: i32,
    #[prost(int32, tag = "5")]
    pub field_type: i32,
    #[prost(string, tag = "6")]
    pub type_name: String,
    #[prost(string, tag = "10")]
    pub json_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ServiceDescriptorProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub method: Vec<MethodDescriptorProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MethodDescriptorProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub input_type: String,
    #[prost(string, tag = "3")]
    pub output_type: String,
    #[prost(message, optional, tag = "4")]
    pub options: Option<MethodOptions>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MethodOptions {
    #[prost(message, optional, tag = "1080")]
    pub view: Option<ViewMethodOptions>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ViewMethodOptions {
    #[prost(message, optional, tag = "1")]
    pub update: Option<UpdateOptions>,
    #[prost(message, optional, tag = "2")]
    pub query: Option<QueryOptions>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateOptions {
    #[prost(string, tag = "1")]
    pub table: String,
    #[prost(bool, tag = "2")]
    pub transform_updates: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryOptions {
    #[prost(string, tag = "1")]
    pub query: String,
}
