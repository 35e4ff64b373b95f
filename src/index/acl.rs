//! Inverted access control lists: user to visible documents.

use std::collections::BTreeSet;

use imbl::OrdSet;

use crate::index::types::{DocNo, SharedMap};

/// Ascending document numbers visible to one user.
pub type DocumentList = OrdSet<DocNo>;

/// Maps each access token to the sorted set of documents it may see.
#[derive(Debug, Clone, Default)]
pub struct AccessIndex {
    users: SharedMap<String, DocumentList>,
}

impl AccessIndex {
    pub fn new() -> Self {
        AccessIndex::default()
    }

    /// Grant `users` access to a document.
    pub fn grant(&mut self, docno: DocNo, users: &[String]) {
        for user in users {
            match self.users.get_mut(user.as_str()) {
                Some(docs) => {
                    docs.insert(docno);
                }
                None => {
                    self.users.insert(user.clone(), DocumentList::unit(docno));
                }
            }
        }
    }

    /// Revoke `users` access to a document.
    pub fn revoke(&mut self, docno: DocNo, users: &[String]) {
        for user in users {
            if let Some(docs) = self.users.get_mut(user.as_str()) {
                docs.remove(&docno);
                if docs.is_empty() {
                    self.users.remove(user.as_str());
                }
            }
        }
    }

    /// Drop a user entirely, returning the documents it had access to.
    pub fn remove_user(&mut self, user: &str) -> Vec<DocNo> {
        self.users
            .remove(user)
            .map(|docs| docs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The document sets of those of `users` that are known. The sets are
    /// shared, not copied.
    pub fn lists_for(&self, users: &[String]) -> Vec<DocumentList> {
        users
            .iter()
            .filter_map(|user| self.users.get(user.as_str()))
            .cloned()
            .collect()
    }

    /// Documents visible to at least one of `users`, ascending.
    pub fn documents_for(&self, users: &[String]) -> Vec<DocNo> {
        let docs: BTreeSet<DocNo> = self
            .lists_for(users)
            .iter()
            .flat_map(|docs| docs.iter().copied())
            .collect();
        docs.into_iter().collect()
    }

    /// All known users, sorted.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.keys().cloned().collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_revoke() {
        let mut acl = AccessIndex::new();
        acl.grant(1, &["a".to_string(), "b".to_string()]);
        acl.grant(3, &["b".to_string()]);

        assert_eq!(acl.documents_for(&["b".to_string()]), vec![1, 3]);
        assert_eq!(acl.documents_for(&["a".to_string(), "c".to_string()]), vec![1]);

        acl.revoke(1, &["a".to_string()]);
        assert_eq!(acl.users(), vec!["b".to_string()]);

        assert_eq!(acl.remove_user("b"), vec![1, 3]);
        assert!(acl.documents_for(&["b".to_string()]).is_empty());
    }

    #[test]
    fn test_clone_keeps_lists_apart() {
        let mut base = AccessIndex::new();
        base.grant(1, &["a".to_string()]);
        let mut next = base.clone();
        next.grant(2, &["a".to_string()]);
        next.revoke(1, &["a".to_string()]);

        assert_eq!(base.documents_for(&["a".to_string()]), vec![1]);
        assert_eq!(next.documents_for(&["a".to_string()]), vec![2]);
        assert_eq!(next.lists_for(&["a".to_string(), "z".to_string()]).len(), 1);
    }
}
