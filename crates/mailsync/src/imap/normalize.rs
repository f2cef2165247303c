//! Conversion between IMAP responses and domain models

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use imap::types::{Fetch, Flag, Name, NameAttribute};

use crate::models::{FolderAttributes, FolderDescriptor, Message, MessageFlags};

/// Special-use attributes of folders that are views over other folders
const AGGREGATE_SPECIAL_USE: &[&str] = &["\\All", "\\Flagged"];

/// Map LIST attributes onto the folder attribute bitmask
pub fn attributes_from(attributes: &[NameAttribute<'_>]) -> FolderAttributes {
    let mut bits = FolderAttributes::NONE;
    for attribute in attributes {
        match attribute {
            NameAttribute::NoInferiors => bits.insert(FolderAttributes::NO_INFERIORS),
            NameAttribute::NoSelect => bits.insert(FolderAttributes::NO_SELECT),
            NameAttribute::Marked => bits.insert(FolderAttributes::MARKED),
            NameAttribute::Unmarked => bits.insert(FolderAttributes::UNMARKED),
            NameAttribute::Custom(name) => {
                if name.eq_ignore_ascii_case("\\HasChildren") {
                    bits.insert(FolderAttributes::HAS_CHILDREN);
                } else if name.eq_ignore_ascii_case("\\HasNoChildren") {
                    bits.insert(FolderAttributes::HAS_NO_CHILDREN);
                } else if name.eq_ignore_ascii_case("\\NoSelect")
                    || name.eq_ignore_ascii_case("\\NonExistent")
                {
                    bits.insert(FolderAttributes::NO_SELECT);
                } else if AGGREGATE_SPECIAL_USE
                    .iter()
                    .any(|special| name.eq_ignore_ascii_case(special))
                {
                    bits.insert(FolderAttributes::VIRTUAL);
                }
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
    bits
}

/// Build a descriptor from a LIST response entry, decoding modified UTF-7
pub fn folder_from_name(name: &Name) -> FolderDescriptor {
    FolderDescriptor::new(
        utf7_imap::decode_utf7_imap(name.name().to_string()),
        attributes_from(name.attributes()),
    )
    .with_delimiter(name.delimiter().map(str::to_string))
}

pub fn flags_from_imap(flags: &[Flag<'_>]) -> MessageFlags {
    let mut out = MessageFlags::default();
    for flag in flags {
        match flag {
            Flag::Seen => out.seen = true,
            Flag::Answered => out.answered = true,
            Flag::Flagged => out.flagged = true,
            Flag::Deleted => out.deleted = true,
            Flag::Draft => out.draft = true,
            Flag::Recent => out.recent = true,
            _ => {}
        }
    }
    out
}

/// Flags to set on APPEND. \Recent is server-managed and never sent.
pub fn flags_to_imap(flags: &MessageFlags) -> Vec<Flag<'static>> {
    let mut out = Vec::new();
    if flags.seen {
        out.push(Flag::Seen);
    }
    if flags.answered {
        out.push(Flag::Answered);
    }
    if flags.flagged {
        out.push(Flag::Flagged);
    }
    if flags.deleted {
        out.push(Flag::Deleted);
    }
    if flags.draft {
        out.push(Flag::Draft);
    }
    out
}

/// Lossy text of a raw header value
pub fn header_text(raw: Option<&[u8]>) -> String {
    raw.map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .unwrap_or_default()
}

/// Build a message from a FETCH response.
///
/// The internal date is preferred; the envelope Date header is the fallback.
pub fn message_from_fetch(fetch: &Fetch, with_body: bool) -> Result<Message> {
    let envelope = fetch.envelope();

    let timestamp = fetch
        .internal_date()
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| {
            let date = header_text(envelope.and_then(|e| e.date));
            DateTime::parse_from_rfc2822(&date)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        })
        .unwrap_or(DateTime::UNIX_EPOCH);

    let mut builder = Message::builder()
        .identity(header_text(envelope.and_then(|e| e.message_id)))
        .subject(header_text(envelope.and_then(|e| e.subject)))
        .timestamp(timestamp)
        .flags(flags_from_imap(fetch.flags()))
        .size(u64::from(fetch.size.unwrap_or(0)));

    if with_body {
        let body = fetch
            .body()
            .ok_or_else(|| anyhow!("Server returned no body for message {}", fetch.message))?;
        builder = builder.body(body.to_vec());
    }

    Ok(builder.build())
}
