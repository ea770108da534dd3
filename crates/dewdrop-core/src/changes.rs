//! Additions and removals between two selections of related-record keys.
//!
//! Used when saving a many-to-many edit: each addition becomes a junction
//! insert and each removal a junction delete.

/// Elements of `left` with no equal element in `right`, in `left` order.
///
/// Comparison is value-based and order-independent. Duplicates in `left`
/// are kept as-is when absent from `right` and dropped when present.
pub fn ordered_difference<T, F>(left: &[T], right: &[T], eq: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T, &T) -> bool,
{
    left.iter()
        .filter(|l| !right.iter().any(|r| eq(l, r)))
        .cloned()
        .collect()
}

/// The diff between an original and a current selection.
///
/// Computed once at construction; read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Changes<T> {
    additions: Vec<T>,
    removals: Vec<T>,
}

impl<T: PartialEq + Clone> Changes<T> {
    /// Diff two selections using `PartialEq`. `None` counts as empty.
    pub fn new(original: Option<Vec<T>>, current: Option<Vec<T>>) -> Self {
        Self::with_eq(original, current, |a, b| a == b)
    }
}

impl<T: Clone> Changes<T> {
    /// Diff two selections using a caller-supplied equality.
    pub fn with_eq<F>(original: Option<Vec<T>>, current: Option<Vec<T>>, eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool,
    {
        let original = original.unwrap_or_default();
        let current = current.unwrap_or_default();
        Self {
            additions: ordered_difference(&current, &original, &eq),
            removals: ordered_difference(&original, &current, &eq),
        }
    }

    /// Keys present in the current selection but not the original.
    pub fn additions(&self) -> &[T] {
        &self.additions
    }

    /// Keys present in the original selection but not the current one.
    pub fn removals(&self) -> &[T] {
        &self.removals
    }

    pub fn has_additions(&self) -> bool {
        !self.additions.is_empty()
    }

    pub fn has_removals(&self) -> bool {
        !self.removals.is_empty()
    }

    /// True when nothing needs to be written.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_basic_diff() {
        let changes = Changes::new(Some(vec![1, 2, 3]), Some(vec![2, 3, 4]));
        assert_eq!(changes.additions(), &[4]);
        assert_eq!(changes.removals(), &[1]);
        assert!(changes.has_additions());
        assert!(changes.has_removals());
    }

    #[test]
    fn test_none_is_empty() {
        let changes = Changes::new(None, Some(vec![5, 6]));
        assert_eq!(changes.additions(), &[5, 6]);
        assert!(!changes.has_removals());

        let changes: Changes<i32> = Changes::new(Some(vec![5]), None);
        assert_eq!(changes.removals(), &[5]);
        assert!(!changes.has_additions());

        let changes: Changes<i32> = Changes::new(None, None);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_reordering_is_not_a_change() {
        let changes = Changes::new(Some(vec![3, 1, 2]), Some(vec![1, 2, 3]));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_preserves_encounter_order() {
        let changes = Changes::new(Some(vec![9, 1, 8]), Some(vec![7, 1, 5, 6]));
        assert_eq!(changes.additions(), &[7, 5, 6]);
        assert_eq!(changes.removals(), &[9, 8]);
    }

    #[test]
    fn test_duplicates_present_on_both_sides_are_excluded() {
        let changes = Changes::new(Some(vec![1, 1, 2]), Some(vec![1, 3, 3]));
        assert_eq!(changes.additions(), &[3, 3]);
        assert_eq!(changes.removals(), &[2]);
    }

    #[test]
    fn test_custom_equality_on_values() {
        let original = vec![Value::BigInt(1), Value::BigInt(2)];
        let current = vec![Value::Text("2".into()), Value::Text("3".into())];
        let changes = Changes::with_eq(Some(original), Some(current), Value::same_key);
        assert_eq!(changes.additions(), &[Value::Text("3".into())]);
        assert_eq!(changes.removals(), &[Value::BigInt(1)]);
    }
}
