use crate::access::DataType;
use crate::catalog::ColumnInfo;

/// Information about an index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    /// Name of the index
    pub index_name: String,
    /// Table columns that make up the index key, in key order
    pub key_columns: Vec<usize>,
    /// Whether this is a unique index
    pub is_unique: bool,
    /// Position of the index inside the table's row store
    pub position: usize,
}

impl IndexInfo {
    /// Key column types, resolved against the owning table's columns
    pub fn key_types(&self, table_columns: &[ColumnInfo]) -> Vec<DataType> {
        self.key_columns
            .iter()
            .map(|&c| table_columns[c].column_type.clone())
            .collect()
    }

    /// Whether `columns` is a leading prefix of this index's key
    pub fn has_prefix(&self, columns: &[usize]) -> bool {
        !columns.is_empty() && self.key_columns.starts_with(columns)
    }

    /// Whether this index covers exactly `columns`, in any order
    pub fn covers_exactly(&self, columns: &[usize]) -> bool {
        self.key_columns.len() == columns.len()
            && columns.iter().all(|c| self.key_columns.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_prefix_matching() {
        let index = IndexInfo {
            index_name: "idx_ab".to_string(),
            key_columns: vec![0, 1],
            is_unique: false,
            position: 0,
        };
        assert!(index.has_prefix(&[0]));
        assert!(index.has_prefix(&[0, 1]));
        assert!(!index.has_prefix(&[1]));
        assert!(!index.has_prefix(&[]));
        assert!(index.covers_exactly(&[1, 0]));
        assert!(!index.covers_exactly(&[0]));

        let columns = vec![
            ColumnInfo::new("a", DataType::Int32),
            ColumnInfo::new("b", DataType::Varchar),
        ];
        assert_eq!(
            index.key_types(&columns),
            vec![DataType::Int32, DataType::Varchar]
        );
    }
}
