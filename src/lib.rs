//! # cursor-chat-monitor
//!
//! Tails the chat history that the [Cursor](https://cursor.com) editor keeps in its
//! local SQLite state database and prints only what is new.
//!
//! ## What it does
//!
//! Cursor stores every composer conversation as a JSON blob under a
//! `composerData:<id>` key in the `cursorDiskKV` table of `state.vscdb`. The store
//! has no change notification, so this tool polls it: every few seconds it reads
//! the matching rows, compares each conversation's message count against the last
//! count it saw, and prints a transcript of the new conversations and of the
//! messages appended to known ones.
//!
//! The database is opened **read-only**; your data is never modified.
//!
//! ## Guarantees
//!
//! - A message is printed at most once per run. Counts only move up; a store that
//!   reports fewer messages than before is logged as an anomaly and ignored.
//! - One malformed row never stops the others from being processed.
//! - A locked or missing database skips the cycle; the next poll retries.
//!
//! ## Usage
//!
//! ```sh
//! # Follow new activity (existing history is treated as already seen)
//! cursor-chat-monitor
//!
//! # Print everything that exists, then follow, also appending to a file
//! cursor-chat-monitor --bootstrap emit-existing -o chats.log
//!
//! # Dump once and exit
//! cursor-chat-monitor --bootstrap emit-existing --once
//! ```
//!
//! Preferences can be persisted in `~/.config/cursor-chat-monitor/config.toml`.
pub mod config;
pub mod diff;
pub mod logging;
pub mod monitor;
pub mod record;
pub mod render;
pub mod sink;
pub mod snapshot;
pub mod store;
