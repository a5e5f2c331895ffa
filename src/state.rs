//! State Pass 1 hands to Pass 2 across process boundaries (§3, §4.2, §5).
//!
//! The two passes are separate invocations: Pass 1 streams the dump once and
//! writes the sidecar stores plus this cache; Pass 2 never touches the XML
//! again and drives entirely off the sidecars and this file. The teacher's
//! `SerdeTopRepoCache` persists its own cross-run state the same way, with a
//! version string written ahead of the payload so a stale cache from a prior
//! build is rejected instead of silently misread.

use crate::error::LevitationError;
use anyhow::Context as _;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read as _;
use std::io::Write as _;
use std::path::Path;

/// Bump whenever [`GlobalState`]'s shape changes, so a cache from an older
/// build is rejected rather than misdecoded.
const CACHE_VERSION_PRELUDE: &str = "git-levitation-state-v1\n";

/// Everything about the dump that Pass 1 only learns once, up front, from
/// `<siteinfo>`, and that Pass 2 needs without re-reading the XML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalState {
    /// Hostname parsed out of `<siteinfo><base>`, used to synthesize commit
    /// author/committer emails as `git.<domain>` when `--author-domain` is
    /// left unset.
    pub domain: String,

    /// Namespace id to localized name, from `<siteinfo><namespaces>`.
    /// Namespace 0 (main) always maps to the empty string.
    pub id_to_ns: BTreeMap<i32, String>,

    /// The reverse of `id_to_ns`, built alongside it so a page title's
    /// colon-prefix can be resolved back to a namespace id without a linear
    /// scan. The two maps are populated together and are always each
    /// other's inverse.
    pub ns_to_id: BTreeMap<String, i32>,

    /// Highest page id seen, for sizing a dense iteration over `MetaStore`.
    pub max_page_id: u32,

    /// Highest revision id seen.
    pub max_rev_id: u32,

    /// Highest upload id assigned, 0 if the dump carried none.
    pub max_upload_id: u64,
}

impl GlobalState {
    /// Records namespace `id` under `name`, keeping `id_to_ns`/`ns_to_id` in
    /// sync. Namespace 0 is always the empty string regardless of what the
    /// dump's `<namespace key="0">` element contains.
    pub fn insert_namespace(&mut self, id: i32, name: impl Into<String>) {
        let name = if id == 0 { String::new() } else { name.into() };
        self.ns_to_id.insert(name.clone(), id);
        self.id_to_ns.insert(id, name);
    }

    pub fn namespace_name(&self, id: i32) -> Option<&str> {
        if id == 0 {
            Some("")
        } else {
            self.id_to_ns.get(&id).map(String::as_str)
        }
    }

    /// Resolves a namespace name back to its id, the inverse of
    /// `namespace_name`. Used to split a page title on its namespace prefix.
    pub fn namespace_id(&self, name: &str) -> Option<i32> {
        if name.is_empty() {
            Some(0)
        } else {
            self.ns_to_id.get(name).copied()
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(
            File::create(path)
                .with_context(|| format!("creating state cache {}", path.display()))?,
        );
        writer.write_all(CACHE_VERSION_PRELUDE.as_bytes())?;
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .with_context(|| format!("encoding state cache {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(
            File::open(path).with_context(|| format!("opening state cache {}", path.display()))?,
        );
        let mut prelude = vec![0u8; CACHE_VERSION_PRELUDE.len()];
        reader
            .read_exact(&mut prelude)
            .with_context(|| format!("reading state cache header {}", path.display()))?;
        if prelude != CACHE_VERSION_PRELUDE.as_bytes() {
            return Err(LevitationError::StaleStateCache(path.display().to_string()).into());
        }
        let (state, _len) = bincode::serde::decode_from_std_read(
            &mut reader,
            bincode::config::standard(),
        )
        .with_context(|| format!("decoding state cache {}", path.display()))?;
        Ok(state)
    }
}

/// Pulls the hostname out of a MediaWiki `<siteinfo><base>` URL, e.g.
/// `https://en.wikipedia.org/wiki/Main_Page` -> `en.wikipedia.org`.
pub fn domain_from_base_url(base_url: &str) -> String {
    let without_scheme = base_url.split("://").nth(1).unwrap_or(base_url);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_state() -> GlobalState {
        let mut state = GlobalState {
            domain: "en.wikipedia.org".to_string(),
            max_page_id: 42,
            max_rev_id: 1000,
            max_upload_id: 3,
            ..Default::default()
        };
        state.insert_namespace(0, "ignored");
        state.insert_namespace(-1, "Special");
        state.insert_namespace(1, "Talk");
        state
    }

    #[test]
    fn round_trips_through_disk() {
        let state = sample_state();
        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();
        let loaded = GlobalState::load(file.path()).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn main_namespace_is_always_empty_string() {
        let state = sample_state();
        assert_eq!(state.namespace_name(0), Some(""));
        assert_eq!(state.namespace_name(1), Some("Talk"));
        assert_eq!(state.namespace_name(99), None);
    }

    #[test]
    fn namespace_id_is_the_inverse_of_namespace_name() {
        let state = sample_state();
        assert_eq!(state.namespace_id(""), Some(0));
        assert_eq!(state.namespace_id("Talk"), Some(1));
        assert_eq!(state.namespace_id("Special"), Some(-1));
        assert_eq!(state.namespace_id("Nonexistent"), None);
    }

    #[test]
    fn parses_the_hostname_out_of_a_base_url() {
        assert_eq!(
            domain_from_base_url("https://en.wikipedia.org/wiki/Main_Page"),
            "en.wikipedia.org"
        );
        assert_eq!(domain_from_base_url("http://localhost:8080/"), "localhost:8080");
    }

    #[test]
    fn rejects_a_cache_with_no_version_prelude() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a cache").unwrap();
        assert!(GlobalState::load(file.path()).is_err());
    }
}
