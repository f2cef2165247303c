//! IMAP server integration
//!
//! This module provides:
//! - A blocking IMAP mail store (TLS or STARTTLS)
//! - Response normalization to domain models

mod client;
mod normalize;

pub use client::ImapMailStore;
pub use normalize::{attributes_from, flags_from_imap, flags_to_imap, message_from_fetch};
