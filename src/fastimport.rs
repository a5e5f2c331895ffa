//! Writes the `git fast-import` command stream (§4.5, §4.6).
//!
//! Framing only: callers decide what blobs and commits to emit and in what
//! order. Grounded on the teacher's `write_commit` in
//! `git_fast_export_import.rs`, trimmed to the one content model this tool
//! ever emits — a commit with exactly one `M 100644` file change.

use crate::marks::BlobMark;
use crate::marks::CommitMark;
use anyhow::Result;
use std::io::Write;

pub struct Signature {
    pub name: String,
    pub email: String,
    pub when_epoch: i64,
    /// `+HHMM`/`-HHMM` UTC offset. The author line always carries `+0000`
    /// since `when_epoch` is itself a UTC second count; the committer line
    /// varies with `--wikitime` (§4.6).
    pub offset: String,
}

impl Signature {
    fn write_to(&self, out: &mut impl Write) -> Result<()> {
        writeln!(
            out,
            "{} <{}> {} {}",
            self.name, self.email, self.when_epoch, self.offset
        )?;
        Ok(())
    }
}

pub struct Commit {
    pub mark: CommitMark,
    pub branch: String,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    /// The previous commit on this branch, `None` for the branch's first.
    pub from: Option<CommitMark>,
    pub file_mark: BlobMark,
    pub file_path: String,
}

pub struct FastImportWriter<W: Write> {
    out: W,
}

impl<W: Write> FastImportWriter<W> {
    pub fn new(out: W) -> Self {
        FastImportWriter { out }
    }

    pub fn blob(&mut self, mark: BlobMark, data: &[u8]) -> Result<()> {
        writeln!(self.out, "blob")?;
        writeln!(self.out, "mark :{mark}")?;
        self.write_data(data)
    }

    pub fn commit(&mut self, commit: &Commit) -> Result<()> {
        writeln!(self.out, "commit {}", commit.branch)?;
        writeln!(self.out, "mark :{}", commit.mark)?;
        write!(self.out, "author ")?;
        commit.author.write_to(&mut self.out)?;
        write!(self.out, "committer ")?;
        commit.committer.write_to(&mut self.out)?;
        self.write_data(commit.message.as_bytes())?;
        if let Some(from) = commit.from {
            writeln!(self.out, "from :{from}")?;
        }
        writeln!(
            self.out,
            "M 100644 :{} {}",
            commit.file_mark, commit.file_path
        )?;
        Ok(())
    }

    pub fn progress(&mut self, message: &str) -> Result<()> {
        writeln!(self.out, "progress {message}")?;
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<()> {
        writeln!(self.out, "data {}", data.len())?;
        self.out.write_all(data)?;
        writeln!(self.out)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_framing_matches_fast_import_grammar() {
        let mut writer = FastImportWriter::new(Vec::new());
        writer.blob(BlobMark::for_revision(1), b"hello").unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out, "blob\nmark :4\ndata 5\nhello\n");
    }

    #[test]
    fn commit_framing_includes_from_when_present() {
        let mut writer = FastImportWriter::new(Vec::new());
        writer
            .commit(&Commit {
                mark: CommitMark::for_commit_number(1),
                branch: "refs/heads/main".to_string(),
                author: Signature {
                    name: "Alice".to_string(),
                    email: "alice@example.org".to_string(),
                    when_epoch: 1_577_836_800,
                    offset: "+0000".to_string(),
                },
                committer: Signature {
                    name: "Alice".to_string(),
                    email: "alice@example.org".to_string(),
                    when_epoch: 1_577_836_800,
                    offset: "+0000".to_string(),
                },
                message: "Edit Dog".to_string(),
                from: Some(CommitMark::for_commit_number(0)),
                file_mark: BlobMark::for_revision(1),
                file_path: "44/6f/Dog".to_string(),
            })
            .unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            out,
            "commit refs/heads/main\n\
             mark :5\n\
             author Alice <alice@example.org> 1577836800 +0000\n\
             committer Alice <alice@example.org> 1577836800 +0000\n\
             data 8\nEdit Dog\n\
             from :2\n\
             M 100644 :4 44/6f/Dog\n"
        );
    }
}
