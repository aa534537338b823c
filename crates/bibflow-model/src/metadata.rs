//! Per-block metadata, namespaced by owner
//!
//! Stages record what they did to a block (so the transformation can be reversed later)
//! under their own key. The map is only addressable through a [`MetadataOwner`], so a
//! stage reaches its own slot by passing itself, never by spelling out a string.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Something that owns exactly one slot in every block's metadata.
pub trait MetadataOwner {
    /// The slot name. Must be unique per owner family.
    fn metadata_key(&self) -> &'static str;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    slots: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<O: MetadataOwner + ?Sized>(&self, owner: &O) -> Option<&serde_json::Value> {
        self.slots.get(owner.metadata_key())
    }

    pub fn get_mut<O: MetadataOwner + ?Sized>(
        &mut self,
        owner: &O,
    ) -> Option<&mut serde_json::Value> {
        self.slots.get_mut(owner.metadata_key())
    }

    /// Store `value` in the owner's slot, returning what was there before.
    pub fn insert<O: MetadataOwner + ?Sized>(
        &mut self,
        owner: &O,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.slots.insert(owner.metadata_key().to_string(), value)
    }

    pub fn remove<O: MetadataOwner + ?Sized>(&mut self, owner: &O) -> Option<serde_json::Value> {
        self.slots.remove(owner.metadata_key())
    }

    /// Names of the occupied slots, for inspection and diagnostics.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
