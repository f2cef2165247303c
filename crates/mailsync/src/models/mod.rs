//! Domain models for mail entities

mod folder;
mod message;

pub use folder::{FolderAttributes, FolderDescriptor, FolderStat};
pub use message::{
    Message, MessageBuilder, MessageFlags, MessageKey, TIMESTAMP_FORMAT, canonical_timestamp,
};
