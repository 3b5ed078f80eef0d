/// Pairs each source column with its target column, if the target has one.
#[derive(Clone, Debug)]
pub struct ColumnMap(Vec<(String, Option<String>)>);

impl ColumnMap {
    /// Matches columns by name. Source-only columns map to `None` and are not
    /// copied; target-only columns are left to their defaults.
    pub fn new(source_cols: &[String], target_cols: &[String]) -> Self {
        let map = source_cols
            .iter()
            .map(|col| {
                let target = target_cols.iter().find(|c| *c == col).cloned();
                (col.clone(), target)
            })
            .collect();
        ColumnMap(map)
    }

    /// Source columns that are copied, in source order.
    pub fn copied(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|(source, target)| target.as_ref().map(|_| source.clone()))
            .collect()
    }

    /// Source columns with no target counterpart.
    pub fn dropped(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, target)| target.is_none())
            .map(|(source, _)| source.clone())
            .collect()
    }

    pub fn is_copied(&self, source_col: &str) -> bool {
        self.0
            .iter()
            .any(|(source, target)| source == source_col && target.is_some())
    }
}
