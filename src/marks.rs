//! `git fast-import` marks are a single namespace shared between every
//! object the stream introduces, blobs and commits alike. Pass 1 hands out
//! blob marks keyed by wiki revision/upload id while it still doesn't know
//! how many commits Pass 2 will emit, and Pass 2 hands out commit marks
//! keyed by a dense 0-indexed counter. [`BlobMark`]/[`CommitMark`] partition
//! the positive integers into three residue classes mod 3 so neither pass
//! needs to know anything about the other to stay collision-free.

use std::fmt;

/// A mark referencing a blob introduced for a wiki revision or an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobMark(u64);

/// A mark referencing a commit, numbered 0, 1, 2, ... in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitMark(u64);

impl BlobMark {
    /// Mark for the blob holding wiki revision `rev_id`'s text.
    pub fn for_revision(rev_id: u32) -> Self {
        BlobMark(1 + 3 * rev_id as u64)
    }

    /// Mark for the blob holding upload `upload_id`'s contents.
    pub fn for_upload(upload_id: u64) -> Self {
        BlobMark(3 + 3 * upload_id)
    }
}

impl CommitMark {
    /// Mark for the `commit_number`-th commit emitted, 0-indexed.
    pub fn for_commit_number(commit_number: u64) -> Self {
        CommitMark(2 + 3 * commit_number)
    }
}

impl fmt::Display for BlobMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommitMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn mark_classes_are_pairwise_disjoint() {
        let mut seen = HashSet::new();
        for r in 0u32..200 {
            assert!(seen.insert(BlobMark::for_revision(r).0));
        }
        for u in 0u64..200 {
            assert!(seen.insert(BlobMark::for_upload(u).0));
        }
        for c in 0u64..200 {
            assert!(seen.insert(CommitMark::for_commit_number(c).0));
        }
    }

    #[test]
    fn matches_the_spec_formulas() {
        assert_eq!(BlobMark::for_revision(7).to_string(), "22");
        assert_eq!(BlobMark::for_upload(0).to_string(), "3");
        assert_eq!(CommitMark::for_commit_number(0).to_string(), "2");
        assert_eq!(CommitMark::for_commit_number(1).to_string(), "5");
    }
}
