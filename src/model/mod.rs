mod document;
mod timestamp;
mod value;

pub use document::Document;
pub use timestamp::Timestamp;
pub use value::{Value, ValueKind};
