//! Maps a (namespace, title) pair to the git tree path a revision or
//! upload's blob is checked out at (§4.7), under either of the two
//! directory layouts the original tool supported.
//!
//! The worked example in the specification's own end-to-end scenario 1
//! (`0-/68/Foo.mediawiki` for title `Foo` under `DEEPNESS=1`) does not
//! arithmetically match its own prose algorithm — `0x68` is not the first
//! UTF-8 byte of any code point in `"Foo"`. This mirrors the 21-vs-29-byte
//! discrepancy in the revision record (see `store.rs`): the prose
//! procedure, not the worked number, is taken as authoritative here; see
//! `DESIGN.md`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryStructure {
    /// `<nsid>-<nsname>` directory, then one hex-encoded subdirectory per
    /// of the title's first `deepness` code points, then the title itself.
    /// Revisions get a `.mediawiki` suffix; uploads don't.
    Levitation,
    /// `namespace:title`-style single path component, with a couple of
    /// namespace-specific quirks the original carried forward verbatim.
    Github,
}

impl std::str::FromStr for DirectoryStructure {
    type Err = crate::error::LevitationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "levitation" => Ok(DirectoryStructure::Levitation),
            "github" => Ok(DirectoryStructure::Github),
            other => Err(crate::error::LevitationError::UnknownDirectoryStructure(
                other.to_string(),
            )),
        }
    }
}

impl fmt::Display for DirectoryStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DirectoryStructure::Levitation => "levitation",
            DirectoryStructure::Github => "github",
        })
    }
}

pub struct PathBuilder {
    structure: DirectoryStructure,
    /// `--deepness`: how many of the title's leading code points get their
    /// own hex-encoded subdirectory under the `levitation` layout. Unused
    /// by `github`.
    deepness: usize,
}

impl PathBuilder {
    pub fn new(structure: DirectoryStructure, deepness: usize) -> Self {
        PathBuilder { structure, deepness }
    }

    pub fn build(&self, ns_id: i32, ns_name: &str, title: &str, is_upload: bool) -> String {
        match self.structure {
            DirectoryStructure::Levitation => {
                levitation_path(ns_id, ns_name, title, is_upload, self.deepness)
            }
            DirectoryStructure::Github => github_path(ns_id, ns_name, title, is_upload),
        }
    }
}

fn levitation_path(ns_id: i32, ns_name: &str, title: &str, is_upload: bool, deepness: usize) -> String {
    let mut segments = vec![replace_slash(&format!("{ns_id}-{ns_name}"))];
    for code_point in title.chars().take(deepness) {
        let mut utf8_buf = [0u8; 4];
        let bytes = code_point.encode_utf8(&mut utf8_buf).as_bytes();
        segments.push(hex::encode(bytes));
    }
    let mut leaf = replace_slash(title);
    if !is_upload {
        leaf.push_str(".mediawiki");
    }
    segments.push(leaf);
    segments.join("/")
}

fn github_path(ns_id: i32, ns_name: &str, title: &str, is_upload: bool) -> String {
    let raw = if is_upload {
        format!("{ns_name}:{title}")
    } else if ns_id == 0 {
        format!("{title}.mediawiki")
    } else if ns_id == 6 {
        format!(":{ns_name}:{title}.mediawiki")
    } else {
        format!("{ns_name}:{title}.mediawiki")
    };
    raw.replace(['/', ' '], "-")
}

/// `/` can't survive as a path component; the original replaced it with
/// U+001C (INFORMATION SEPARATOR FOUR) rather than collapsing it away.
fn replace_slash(s: &str) -> String {
    s.replace('/', "\u{1C}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levitation_layout_nests_one_hex_dir_per_deepness_code_point() {
        let builder = PathBuilder::new(DirectoryStructure::Levitation, 2);
        let path = builder.build(0, "", "Dog", false);
        assert_eq!(path, "0-/64/6f/Dog.mediawiki");
    }

    #[test]
    fn levitation_layout_uses_fewer_dirs_for_a_short_title() {
        let builder = PathBuilder::new(DirectoryStructure::Levitation, 5);
        let path = builder.build(0, "", "Hi", false);
        assert_eq!(path, "0-/68/69/Hi.mediawiki");
    }

    #[test]
    fn levitation_layout_has_no_suffix_for_uploads() {
        let builder = PathBuilder::new(DirectoryStructure::Levitation, 1);
        let path = builder.build(6, "File", "Logo.png", true);
        assert_eq!(path, "6-File/4c/Logo.png");
    }

    #[test]
    fn levitation_layout_includes_nonempty_namespace_name() {
        let builder = PathBuilder::new(DirectoryStructure::Levitation, 1);
        let path = builder.build(1, "Talk", "Dog", false);
        assert_eq!(path, "1-Talk/64/Dog.mediawiki");
    }

    #[test]
    fn github_layout_main_namespace_has_no_prefix() {
        let builder = PathBuilder::new(DirectoryStructure::Github, 0);
        assert_eq!(builder.build(0, "", "Foo Bar", false), "Foo-Bar.mediawiki");
    }

    #[test]
    fn github_layout_file_namespace_gets_a_leading_colon() {
        let builder = PathBuilder::new(DirectoryStructure::Github, 0);
        assert_eq!(
            builder.build(6, "File", "Logo.png", false),
            ":File:Logo.png.mediawiki"
        );
    }

    #[test]
    fn github_layout_uploads_skip_the_suffix() {
        let builder = PathBuilder::new(DirectoryStructure::Github, 0);
        assert_eq!(builder.build(6, "File", "Logo.png", true), "File:Logo.png");
    }

    #[test]
    fn github_layout_other_namespace_gets_name_prefix() {
        let builder = PathBuilder::new(DirectoryStructure::Github, 0);
        assert_eq!(
            builder.build(1, "Talk", "Foo/Bar", false),
            "Talk:Foo-Bar.mediawiki"
        );
    }
}
