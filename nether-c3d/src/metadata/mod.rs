//! Parameter section: groups of named, typed parameters
//!
//! Groups are owned by [`MetadataStore`] and reachable both by numeric id
//! and by upper-case name. Parameters are addressed as `"GROUP:PARAM"` or
//! `"GROUP.PARAM"`.

mod group;
mod param;
mod parser;
mod serializer;


use std::fmt;

use hashbrown::HashMap;

pub use group::Group;
pub use param::{CHAR_WIDTH, Param, ParamValue};

use crate::BLOCK_SIZE;
use crate::error::{C3dError, Result};
use crate::processor::Processor;

/// Largest group id a parameter record can reference (ids are signed bytes)
pub const MAX_GROUP_ID: u8 = 127;

/// Bytes before the first record: two reserved bytes, block count, processor tag
pub const SECTION_PROLOGUE: usize = 4;

/// Group lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey<'a> {
    Id(u8),
    Name(&'a str),
}

impl From<u8> for GroupKey<'_> {
    fn from(id: u8) -> Self {
        GroupKey::Id(id)
    }
}

impl<'a> From<&'a str> for GroupKey<'a> {
    fn from(name: &'a str) -> Self {
        GroupKey::Name(name)
    }
}

impl<'a> From<&'a String> for GroupKey<'a> {
    fn from(name: &'a String) -> Self {
        GroupKey::Name(name)
    }
}

impl fmt::Display for GroupKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Id(id) => write!(f, "#{id}"),
            GroupKey::Name(name) => f.write_str(name),
        }
    }
}

/// All groups of a file's parameter section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    processor: Processor,
    groups: HashMap<u8, Group>,
    names: HashMap<String, u8>,
}

impl MetadataStore {
    pub fn new(processor: Processor) -> Self {
        Self {
            processor,
            groups: HashMap::new(),
            names: HashMap::new(),
        }
    }

    /// Parse the records following the 4-byte section prologue
    pub fn parse(records: &[u8], processor: Processor) -> Result<Self> {
        parser::parse_records(records, processor)
    }

    /// Serialize the whole section, prologue included, padded to whole blocks
    pub fn serialize(&self) -> Result<Vec<u8>> {
        serializer::serialize_section(self)
    }

    pub fn processor(&self) -> Processor {
        self.processor
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in ascending id order
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        let mut groups: Vec<&Group> = self.groups.values().collect();
        groups.sort_by_key(|g| g.id());
        groups.into_iter()
    }

    pub fn group<'a>(&self, key: impl Into<GroupKey<'a>>) -> Option<&Group> {
        let id = self.resolve(key.into())?;
        self.groups.get(&id)
    }

    pub fn group_mut<'a>(&mut self, key: impl Into<GroupKey<'a>>) -> Option<&mut Group> {
        let id = self.resolve(key.into())?;
        self.groups.get_mut(&id)
    }

    pub fn contains_group<'a>(&self, key: impl Into<GroupKey<'a>>) -> bool {
        self.resolve(key.into()).is_some()
    }

    /// Add an empty group; both the id and the name must be unused
    pub fn add_group(&mut self, id: u8, name: &str, desc: &str) -> Result<&mut Group> {
        check_group_id(id)?;
        let name = normalize_name(name)?;
        if self.groups.contains_key(&id) {
            return Err(C3dError::DuplicateGroup(format!("id {id}")));
        }
        if self.names.contains_key(&name) {
            return Err(C3dError::DuplicateGroup(name));
        }

        let mut group = Group::new(id, name.clone(), self.processor);
        group.set_desc(desc)?;
        self.names.insert(name, id);
        Ok(self.groups.entry(id).or_insert(group))
    }

    /// Change a group's name, keeping both lookups consistent
    pub fn rename_group<'a>(&mut self, key: impl Into<GroupKey<'a>>, new_name: &str) -> Result<()> {
        let key = key.into();
        let id = self
            .resolve(key)
            .ok_or_else(|| C3dError::GroupNotFound(key.to_string()))?;
        let new_name = normalize_name(new_name)?;
        if let Some(&owner) = self.names.get(&new_name) {
            if owner == id {
                return Ok(());
            }
            return Err(C3dError::DuplicateGroup(new_name));
        }

        let group = self
            .groups
            .get_mut(&id)
            .ok_or_else(|| C3dError::GroupNotFound(key.to_string()))?;
        self.names.remove(group.name());
        group.set_name(new_name.clone());
        self.names.insert(new_name, id);
        Ok(())
    }

    pub fn remove_group<'a>(&mut self, key: impl Into<GroupKey<'a>>) -> Option<Group> {
        let id = self.resolve(key.into())?;
        let group = self.groups.remove(&id)?;
        self.names.remove(group.name());
        Some(group)
    }

    /// Look up a group by name, creating it with the next free id if absent
    pub fn get_or_create_group(&mut self, name: &str) -> Result<&mut Group> {
        let normalized = normalize_name(name)?;
        if let Some(&id) = self.names.get(&normalized) {
            return self
                .groups
                .get_mut(&id)
                .ok_or_else(|| C3dError::GroupNotFound(normalized));
        }
        let id = self.next_group_id()?;
        self.add_group(id, &normalized, "")
    }

    pub fn max_group_id(&self) -> u8 {
        self.groups.keys().copied().max().unwrap_or(0)
    }

    pub fn next_group_id(&self) -> Result<u8> {
        let next = self.max_group_id() as usize + 1;
        if next > MAX_GROUP_ID as usize {
            return Err(C3dError::metadata("no free group ids left"));
        }
        Ok(next as u8)
    }

    /// Parameter by compound key, e.g. `"POINT:USED"` or `"point.used"`
    pub fn param(&self, key: &str) -> Option<&Param> {
        let (group, param) = split_key(key)?;
        self.group(group)?.param(param)
    }

    pub fn param_mut(&mut self, key: &str) -> Option<&mut Param> {
        let (group, param) = split_key(key)?;
        self.group_mut(group)?.param_mut(param)
    }

    pub fn contains_param(&self, key: &str) -> bool {
        self.param(key).is_some()
    }

    /// 512-byte blocks needed to serialize this store
    pub fn parameter_blocks(&self) -> usize {
        self.section_len().div_ceil(BLOCK_SIZE)
    }

    /// Unpadded byte length of the serialized section
    pub(crate) fn section_len(&self) -> usize {
        SECTION_PROLOGUE
            + self
                .groups
                .values()
                .map(|g| g.binary_size() + g.params().map(Param::binary_size).sum::<usize>())
                .sum::<usize>()
    }

    /// Group for `id`, created nameless if the file has not defined it yet
    pub(crate) fn ensure_group(&mut self, id: u8) -> &mut Group {
        let processor = self.processor;
        self.groups
            .entry(id)
            .or_insert_with(|| Group::new(id, String::new(), processor))
    }

    /// Apply a group definition record, naming a possibly implicit group
    pub(crate) fn define_group(&mut self, id: u8, name: String, desc: Vec<u8>) -> Result<()> {
        if id > MAX_GROUP_ID {
            return Err(C3dError::metadata(format!(
                "group {name} has id {id}, ids stop at {MAX_GROUP_ID}"
            )));
        }
        if let Some(&owner) = self.names.get(&name)
            && owner != id
        {
            return Err(C3dError::metadata(format!(
                "group name {name} used by ids {owner} and {id}"
            )));
        }

        let group = self.ensure_group(id);
        let old_name = group.name().to_string();
        group.set_name(name.clone());
        group.set_desc_bytes(desc);
        if !old_name.is_empty() && old_name != name {
            self.names.remove(&old_name);
        }
        self.names.insert(name, id);
        Ok(())
    }

    fn resolve(&self, key: GroupKey<'_>) -> Option<u8> {
        match key {
            GroupKey::Id(id) => self.groups.contains_key(&id).then_some(id),
            GroupKey::Name(name) => {
                let name = normalize_name(name).ok()?;
                self.names.get(&name).copied()
            }
        }
    }
}

/// Upper-case, trimmed name; must be 1..=127 bytes
pub(crate) fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim().to_ascii_uppercase();
    if name.is_empty() || name.len() > i8::MAX as usize {
        return Err(C3dError::invalid_value(format!(
            "name {name:?} must be between 1 and 127 bytes"
        )));
    }
    Ok(name)
}

fn check_group_id(id: u8) -> Result<()> {
    if id == 0 || id > MAX_GROUP_ID {
        return Err(C3dError::invalid_value(format!(
            "group id {id} outside 1..=127"
        )));
    }
    Ok(())
}

fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(':').or_else(|| key.split_once('.'))
}
