//! Index metadata page.

use quarry_common::page::PageNo;
use quarry_common::{AttrType, QuarryError, Result};

/// Metadata stored on the first page of every index file.
///
/// Layout (32 bytes, little-endian):
/// - relation_name: 20 bytes, null-padded ASCII
/// - attr_byte_offset: 4 bytes
/// - attr_type tag: 4 bytes
/// - root_page_no: 4 bytes
///
/// The root page number is rewritten whenever a root split moves the root;
/// everything else is fixed at creation time and verified on reopen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Name of the base relation.
    pub relation_name: String,
    /// Byte offset of the indexed attribute inside each record.
    pub attr_byte_offset: u32,
    /// Type of the indexed attribute.
    pub attr_type: AttrType,
    /// Page number of the current root node.
    pub root_page_no: PageNo,
}

impl IndexMeta {
    /// Size of the metadata block in bytes.
    pub const SIZE: usize = 32;

    /// On-disk length of the relation name field (19 chars + NUL).
    pub const RELATION_NAME_LEN: usize = 20;

    /// Creates metadata for a new index. Names longer than 19 bytes are
    /// truncated, matching the on-disk field width.
    pub fn new(
        relation_name: &str,
        attr_byte_offset: u32,
        attr_type: AttrType,
        root_page_no: PageNo,
    ) -> Self {
        let mut name = relation_name.to_string();
        name.truncate(Self::RELATION_NAME_LEN - 1);
        Self {
            relation_name: name,
            attr_byte_offset,
            attr_type,
            root_page_no,
        }
    }

    /// Serializes the metadata block.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let name_bytes = self.relation_name.as_bytes();
        let len = name_bytes.len().min(Self::RELATION_NAME_LEN - 1);
        buf[..len].copy_from_slice(&name_bytes[..len]);
        buf[20..24].copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        buf[24..28].copy_from_slice(&self.attr_type.tag().to_le_bytes());
        buf[28..32].copy_from_slice(&self.root_page_no.to_le_bytes());
        buf
    }

    /// Deserializes the metadata block from the start of a page.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let name_end = buf[..Self::RELATION_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(Self::RELATION_NAME_LEN - 1);
        let relation_name = String::from_utf8_lossy(&buf[..name_end]).into_owned();

        let attr_byte_offset = u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]);
        let tag = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
        let attr_type = AttrType::from_tag(tag)
            .ok_or_else(|| QuarryError::BadIndexInfo(format!("unknown attribute type tag {tag}")))?;
        let root_page_no = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);

        Ok(Self {
            relation_name,
            attr_byte_offset,
            attr_type,
            root_page_no,
        })
    }

    /// Checks the persisted metadata against open parameters.
    pub fn matches(&self, relation_name: &str, attr_byte_offset: u32, attr_type: AttrType) -> bool {
        let mut expected = relation_name.to_string();
        expected.truncate(Self::RELATION_NAME_LEN - 1);
        self.relation_name == expected
            && self.attr_byte_offset == attr_byte_offset
            && self.attr_type == attr_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_meta_roundtrip() {
        let meta = IndexMeta::new("employees", 8, AttrType::Int, 2);
        let bytes = meta.to_bytes();
        let decoded = IndexMeta::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_index_meta_name_truncation() {
        let long_name = "a_relation_name_that_is_far_too_long";
        let meta = IndexMeta::new(long_name, 4, AttrType::Int, 2);

        assert_eq!(meta.relation_name.len(), IndexMeta::RELATION_NAME_LEN - 1);

        let decoded = IndexMeta::from_bytes(&meta.to_bytes()).unwrap();
        assert_eq!(decoded.relation_name, meta.relation_name);
        assert!(meta.matches(long_name, 4, AttrType::Int));
    }

    #[test]
    fn test_index_meta_matches() {
        let meta = IndexMeta::new("rel", 4, AttrType::Int, 2);

        assert!(meta.matches("rel", 4, AttrType::Int));
        assert!(!meta.matches("other", 4, AttrType::Int));
        assert!(!meta.matches("rel", 8, AttrType::Int));
        assert!(!meta.matches("rel", 4, AttrType::Double));
    }

    #[test]
    fn test_index_meta_bad_type_tag() {
        let meta = IndexMeta::new("rel", 4, AttrType::Int, 2);
        let mut bytes = meta.to_bytes();
        bytes[24..28].copy_from_slice(&99u32.to_le_bytes());

        let result = IndexMeta::from_bytes(&bytes);
        assert!(matches!(result, Err(QuarryError::BadIndexInfo(_))));
    }

    #[test]
    fn test_index_meta_root_update() {
        let mut meta = IndexMeta::new("rel", 4, AttrType::Int, 2);
        meta.root_page_no = 9;

        let decoded = IndexMeta::from_bytes(&meta.to_bytes()).unwrap();
        assert_eq!(decoded.root_page_no, 9);
    }
}
