//! Data models for redsweep.
//!
//! This module contains the item snapshots fetched from the platform and the
//! archive records written before each mutation.

mod item;
mod record;

pub use item::{Comment, Item, ItemBase, ItemKind, Post};
pub use record::{DeletionRecord, RecordContent, SourceTag};
