use std::collections::hash_set;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// 无序去重的 ID 集合（索引桶的值）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringSet(HashSet<String>);

impl StringSet {
    pub fn new() -> Self {
        Self(HashSet::new())
    }

    /// 返回 true 表示本次为新插入
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    /// 返回 true 表示存在并移除
    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_set::Iter<'_, String> {
        self.0.iter()
    }

    /// 导出为有序序列（输出稳定，便于日志与比较）
    pub fn as_slice(&self) -> Vec<String> {
        let mut out: Vec<String> = self.0.iter().cloned().collect();
        out.sort_unstable();
        out
    }

    /// self - other
    pub fn difference(&self, other: &StringSet) -> StringSet {
        self.0
            .iter()
            .filter(|id| !other.has(id))
            .cloned()
            .collect()
    }

    pub fn intersection(&self, other: &StringSet) -> StringSet {
        self.0.iter().filter(|id| other.has(id)).cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for StringSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for StringSet {
    type Item = String;
    type IntoIter = hash_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a StringSet {
    type Item = &'a String;
    type IntoIter = hash_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_deduplicated() {
        let mut set = StringSet::new();
        assert!(set.add("P1"));
        assert!(!set.add("P1"));
        assert_eq!(set.size(), 1);
        assert!(set.remove("P1"));
        assert!(!set.remove("P1"));
        assert!(set.is_empty());
    }

    #[test]
    fn difference_and_sorted_export() {
        let a: StringSet = ["F3", "F1", "F2"].into_iter().collect();
        let b: StringSet = ["F2"].into_iter().collect();
        assert_eq!(a.difference(&b).as_slice(), vec!["F1", "F3"]);
        assert!(b.difference(&a).is_empty());
    }
}
