//! # Core Wire Components
//!
//! Byte buffers, the property tree, serializers and frame codecs.
//!
//! ## Components
//! - **Buffer**: Cursor-based big-endian reads and writes
//! - **Property**: Schema-less Literal/Object/List/Null tree
//! - **Serializer**: Type-keyed serializers with supertype fallback
//! - **Frame**: Packet identities plus blocking frame I/O
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Id(4)] [Length(4)] [Payload(N)]
//! ```
//!
//! ## Safety
//! - Maximum payload size is configurable (default 16MB)
//! - Length validation before allocation

pub mod buffer;
pub mod codec;
pub mod frame;
pub mod property;
pub mod serializer;
