//! Unified resource iteration facade over the PE three-level tree and the
//! NE flat resource table (component I, spec.md §4.I).
//!
//! Both formats are normalized into a flat list of [`ResourceItem`]s keyed
//! by `(type, name-or-id, language)`; NE entries always carry
//! `language == 0` per spec.md §4.I ("NE: flat, language-neutral").

use alloc::string::String;
use alloc::vec::Vec;

use crate::ne::resource::{NeResourceEntry, NeTypeOrName};
use crate::pe::resource::{ResourceLeaf, ResourceName};

/// A resource's type or name/id key, unified across PE and NE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKey {
    Id(u16),
    Name(String),
}

impl From<ResourceName> for ResourceKey {
    fn from(n: ResourceName) -> Self {
        match n {
            ResourceName::Id(id) => ResourceKey::Id(id),
            ResourceName::Name(s) => ResourceKey::Name(s),
        }
    }
}

impl From<NeTypeOrName> for ResourceKey {
    fn from(n: NeTypeOrName) -> Self {
        match n {
            NeTypeOrName::Id(id) => ResourceKey::Id(id),
            NeTypeOrName::Name(s) => ResourceKey::Name(s),
        }
    }
}

/// One resource, normalized from either a PE tree leaf or an NE table
/// entry.
#[derive(Debug, Clone)]
pub struct ResourceItem<'a> {
    pub resource_type: ResourceKey,
    pub name: ResourceKey,
    pub language: u16,
    pub data: &'a [u8],
}

/// A flattened, queryable view over every resource in a file.
#[derive(Debug, Clone, Default)]
pub struct Resources<'a> {
    items: Vec<ResourceItem<'a>>,
}

impl<'a> Resources<'a> {
    pub fn from_pe(leaves: &[ResourceLeaf<'a>]) -> Self {
        let items = leaves
            .iter()
            .map(|leaf| {
                let language = match &leaf.language {
                    ResourceName::Id(id) => *id,
                    ResourceName::Name(_) => 0,
                };
                ResourceItem {
                    resource_type: leaf.type_id.clone().into(),
                    name: leaf.name.clone().into(),
                    language,
                    data: leaf.data,
                }
            })
            .collect();
        Resources { items }
    }

    /// `bytes` is the whole NE file buffer; `entries` carry absolute file
    /// offsets (already shifted by the alignment factor).
    pub fn from_ne(bytes: &'a [u8], entries: &[NeResourceEntry]) -> Self {
        let items = entries
            .iter()
            .map(|e| {
                let start = e.offset as usize;
                let end = start.saturating_add(e.length as usize).min(bytes.len());
                let data = bytes.get(start..end).unwrap_or(&[]);
                ResourceItem {
                    resource_type: e.resource_type.clone().into(),
                    name: e.name.clone().into(),
                    language: 0,
                    data,
                }
            })
            .collect();
        Resources { items }
    }

    pub fn all_resources(&self) -> &[ResourceItem<'a>] {
        &self.items
    }

    pub fn by_type(&self, type_key: &ResourceKey) -> Vec<&ResourceItem<'a>> {
        self.items.iter().filter(|i| &i.resource_type == type_key).collect()
    }

    /// Looks up a single resource by type, name-or-id, and optional
    /// language (the first match is returned when `lang` is `None`).
    pub fn find(&self, type_key: &ResourceKey, name_key: &ResourceKey, lang: Option<u16>) -> Option<&ResourceItem<'a>> {
        self.items.iter().find(|i| {
            &i.resource_type == type_key
                && &i.name == name_key
                && match lang {
                    Some(l) => l == i.language,
                    None => true,
                }
        })
    }

    pub fn types(&self) -> Vec<ResourceKey> {
        let mut seen = Vec::new();
        for item in &self.items {
            if !seen.contains(&item.resource_type) {
                seen.push(item.resource_type.clone());
            }
        }
        seen
    }

    pub fn ids_for_type(&self, type_key: &ResourceKey) -> Vec<u16> {
        let mut ids = Vec::new();
        for item in &self.items {
            if &item.resource_type == type_key {
                if let ResourceKey::Id(id) = &item.name {
                    if !ids.contains(id) {
                        ids.push(*id);
                    }
                }
            }
        }
        ids
    }

    pub fn names_for_type(&self, type_key: &ResourceKey) -> Vec<String> {
        let mut names = Vec::new();
        for item in &self.items {
            if &item.resource_type == type_key {
                if let ResourceKey::Name(name) = &item.name {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    }

    pub fn languages_for(&self, type_key: &ResourceKey, name_key: &ResourceKey) -> Vec<u16> {
        let mut langs = Vec::new();
        for item in &self.items {
            if &item.resource_type == type_key && &item.name == name_key && !langs.contains(&item.language) {
                langs.push(item.language);
            }
        }
        langs
    }

    pub fn languages(&self) -> Vec<u16> {
        let mut langs = Vec::new();
        for item in &self.items {
            if !langs.contains(&item.language) {
                langs.push(item.language);
            }
        }
        langs
    }
}
