//! Ordered name-to-address tables.
//!
//! A [`LabelTable`] is used for both a section's symbols and its literal pool.
//! Names are unique and iteration follows insertion order, which is the order
//! literals are placed in at a flush point and the order listings are written in.

use indexmap::IndexMap;

/// Errors raised by [`LabelTable`] operations.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LabelErr {
    /// The name is already in the table.
    DuplicateName(String),
    /// The name is not in the table.
    UnknownName(String),
}
impl std::fmt::Display for LabelErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelErr::DuplicateName(n) => write!(f, "name `{n}` was already defined"),
            LabelErr::UnknownName(n)   => write!(f, "name `{n}` is not defined"),
        }
    }
}
impl std::error::Error for LabelErr {}
impl crate::err::Error for LabelErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LabelErr::DuplicateName(_) => Some("labels must be unique within a section".into()),
            LabelErr::UnknownName(_)   => None,
        }
    }
}

/// An ordered, name-unique table of addresses.
///
/// An entry with no address has been declared but not yet located
/// (a literal before its flush point).
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct LabelTable(IndexMap<String, Option<u32>>);

impl LabelTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a located name.
    pub fn insert(&mut self, name: &str, addr: u32) -> Result<(), LabelErr> {
        self.insert_entry(name, Some(addr))
    }

    /// Inserts a name that has no address yet.
    pub fn declare_pending(&mut self, name: &str) -> Result<(), LabelErr> {
        self.insert_entry(name, None)
    }

    fn insert_entry(&mut self, name: &str, addr: Option<u32>) -> Result<(), LabelErr> {
        match self.0.contains_key(name) {
            true  => Err(LabelErr::DuplicateName(name.to_string())),
            false => {
                self.0.insert(name.to_string(), addr);
                Ok(())
            }
        }
    }

    /// Whether the name is in the table (located or not).
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Gets the address of a located name.
    ///
    /// This returns `None` if the name is absent or not yet located.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.0.get(name).copied().flatten()
    }

    /// Sets the address of an existing name.
    pub fn correct(&mut self, name: &str, addr: u32) -> Result<(), LabelErr> {
        match self.0.get_mut(name) {
            Some(slot) => {
                *slot = Some(addr);
                Ok(())
            },
            None => Err(LabelErr::UnknownName(name.to_string())),
        }
    }

    /// Names that have not been located yet, in insertion order.
    pub fn pending(&self) -> impl Iterator<Item=&str> + '_ {
        self.0.iter()
            .filter(|(_, addr)| addr.is_none())
            .map(|(name, _)| name.as_str())
    }

    /// Iterates over every entry in insertion order.
    pub fn iter(&self) -> impl Iterator<Item=(&str, Option<u32>)> + '_ {
        self.0.iter().map(|(name, &addr)| (name.as_str(), addr))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{LabelErr, LabelTable};

    #[test]
    fn test_insert_lookup() {
        let mut table = LabelTable::new();
        table.insert("FIRST", 0).unwrap();
        table.insert("CLOOP", 6).unwrap();

        assert_eq!(table.lookup("FIRST"), Some(0));
        assert_eq!(table.lookup("CLOOP"), Some(6));
        assert_eq!(table.lookup("ENDFIL"), None);

        assert_eq!(table.insert("FIRST", 9), Err(LabelErr::DuplicateName("FIRST".into())));
        assert_eq!(table.lookup("FIRST"), Some(0), "first definition should be kept");
    }

    #[test]
    fn test_pending_and_correct() {
        let mut table = LabelTable::new();
        table.declare_pending("=C'EOF'").unwrap();
        table.declare_pending("=3").unwrap();
        assert!(table.contains("=C'EOF'"));
        assert_eq!(table.lookup("=C'EOF'"), None);
        assert_eq!(table.pending().collect::<Vec<_>>(), ["=C'EOF'", "=3"]);

        table.correct("=C'EOF'", 0x2D).unwrap();
        assert_eq!(table.lookup("=C'EOF'"), Some(0x2D));
        assert_eq!(table.pending().collect::<Vec<_>>(), ["=3"]);

        assert_eq!(table.correct("=X'05'", 0), Err(LabelErr::UnknownName("=X'05'".into())));
        assert_eq!(table.declare_pending("=3"), Err(LabelErr::DuplicateName("=3".into())));
    }

    #[test]
    fn test_insertion_order() {
        let mut table = LabelTable::new();
        for (i, name) in ["ZETA", "ALPHA", "MID"].into_iter().enumerate() {
            table.insert(name, i as u32 * 3).unwrap();
        }
        table.correct("ALPHA", 100).unwrap();

        let entries: Vec<_> = table.iter().collect();
        assert_eq!(entries, [("ZETA", Some(0)), ("ALPHA", Some(100)), ("MID", Some(6))]);
        assert_eq!(table.len(), 3);
    }
}
