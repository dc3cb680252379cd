//! Parameter groups

use super::normalize_name;
use super::param::{CHAR_WIDTH, Param, ParamValue, encode_desc};
use crate::error::{C3dError, Result};
use crate::processor::Processor;

/// A named collection of parameters
///
/// Parameters keep their insertion order, which is the order they are
/// written back out in. Lookup by name is case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: u8,
    name: String,
    /// Description bytes in the file's text encoding
    desc: Vec<u8>,
    processor: Processor,
    params: Vec<Param>,
}

impl Group {
    pub(crate) fn new(id: u8, name: String, processor: Processor) -> Self {
        Self {
            id,
            name,
            desc: Vec::new(),
            processor,
            params: Vec::new(),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Upper-case group name (empty for groups never defined in the file)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> String {
        self.processor.decode_string(&self.desc)
    }

    /// Description exactly as stored in the record
    pub fn desc_bytes(&self) -> &[u8] {
        &self.desc
    }

    pub fn set_desc(&mut self, desc: &str) -> Result<()> {
        self.desc = encode_desc(desc, self.processor, &self.name)?;
        Ok(())
    }

    pub fn processor(&self) -> Processor {
        self.processor
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_desc_bytes(&mut self, desc: Vec<u8>) {
        self.desc = desc;
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        let index = self.position(name)?;
        self.params.get(index)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Param> {
        let index = self.position(name)?;
        self.params.get_mut(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Add a parameter, failing if the name is taken
    pub fn add_param(&mut self, param: Param) -> Result<()> {
        if self.contains(param.name()) {
            return Err(C3dError::invalid_value(format!(
                "parameter {}:{} already exists",
                self.name,
                param.name()
            )));
        }
        self.params.push(param);
        Ok(())
    }

    /// Add a parameter, replacing any existing one with the same name in place
    pub fn set_param(&mut self, param: Param) {
        match self.position(param.name()) {
            Some(index) => self.params[index] = param,
            None => self.params.push(param),
        }
    }

    pub fn remove_param(&mut self, name: &str) -> Option<Param> {
        let index = self.position(name)?;
        Some(self.params.remove(index))
    }

    // ========== Typed setters ==========

    pub fn set<T: ParamValue>(&mut self, name: &str, desc: &str, value: T) -> Result<()> {
        let param = Param::scalar(name, desc, value, self.processor)?;
        self.set_param(param);
        Ok(())
    }

    pub fn set_array<T: ParamValue>(&mut self, name: &str, desc: &str, values: &[T]) -> Result<()> {
        let param = Param::array(name, desc, values, self.processor)?;
        self.set_param(param);
        Ok(())
    }

    /// Zero-length array with the given element width
    pub fn set_empty_array(&mut self, name: &str, desc: &str, width: i8) -> Result<()> {
        let param = Param::new(name, desc, width, vec![0], Vec::new(), self.processor)?;
        self.set_param(param);
        Ok(())
    }

    pub fn set_str(&mut self, name: &str, desc: &str, value: &str) -> Result<()> {
        let param = Param::string(name, desc, value, self.processor)?;
        self.set_param(param);
        Ok(())
    }

    pub fn set_str_array<S: AsRef<str>>(&mut self, name: &str, desc: &str, values: &[S]) -> Result<()> {
        let param = Param::strings(name, desc, values, self.processor)?;
        self.set_param(param);
        Ok(())
    }

    // ========== Typed getters ==========

    pub fn get<T: ParamValue>(&self, name: &str) -> Option<T> {
        self.param(name)?.value().ok()
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.param(name)?.string_value().ok()
    }

    pub fn get_str_array(&self, name: &str) -> Option<Vec<String>> {
        let param = self.param(name)?;
        if param.bytes_per_element() != CHAR_WIDTH {
            return None;
        }
        param.string_array().ok()
    }

    /// Bytes of the group definition record alone
    pub(crate) fn binary_size(&self) -> usize {
        // name_len + group_id + name + offset + desc_len + desc
        2 + self.name.len() + 2 + 1 + self.desc.len()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = normalize_name(name).ok()?;
        self.params.iter().position(|p| p.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_group() -> Group {
        let mut group = Group::new(1, "POINT".to_string(), Processor::Intel);
        group.set_desc("3-D point data").unwrap();
        group
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut group = point_group();
        group.set("USED", "", 4u16).unwrap();
        assert!(group.contains("used"));
        assert_eq!(group.get::<u16>("Used"), Some(4));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut group = point_group();
        group.set("USED", "", 4u16).unwrap();
        group.set("RATE", "", 50.0f32).unwrap();
        group.set("USED", "", 8u16).unwrap();

        let names: Vec<&str> = group.params().map(Param::name).collect();
        assert_eq!(names, vec!["USED", "RATE"]);
        assert_eq!(group.get::<u16>("USED"), Some(8));
    }

    #[test]
    fn test_add_param_rejects_duplicate() {
        let mut group = point_group();
        group.set("USED", "", 4u16).unwrap();
        let dup = Param::scalar("used", "", 1u16, Processor::Intel).unwrap();
        assert!(group.add_param(dup).is_err());
    }

    #[test]
    fn test_remove_param() {
        let mut group = point_group();
        group.set_str("UNITS", "", "mm").unwrap();
        assert!(group.remove_param("units").is_some());
        assert!(group.is_empty());
        assert!(group.remove_param("UNITS").is_none());
    }

    #[test]
    fn test_typed_getters() {
        let mut group = point_group();
        group.set_str_array("LABELS", "", &["A", "BB"]).unwrap();
        group.set_empty_array("SCALE", "", 4).unwrap();
        assert_eq!(group.get_str_array("LABELS").unwrap(), vec!["A", "BB"]);
        assert_eq!(group.param("SCALE").unwrap().dimensions(), &[0]);
        assert_eq!(group.get::<f32>("SCALE"), None);
        assert_eq!(group.get_str_array("SCALE"), None);
    }

    #[test]
    fn test_binary_size() {
        let group = point_group();
        assert_eq!(group.binary_size(), 2 + 5 + 2 + 1 + 14);
    }
}
