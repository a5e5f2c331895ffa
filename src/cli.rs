//! Command line surface, two subcommands for the two passes (§5, §6).
//!
//! The `-v`/`-q` verbosity group is carried over unchanged from the
//! teacher's `LogLevelArg` pattern: repeatable counted flags offset from a
//! sensible default level, clamped rather than wrapping past the ends of
//! the `log::LevelFilter` scale.

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use itertools::Itertools as _;
use std::path::PathBuf;

const ABOUT: &str = "Converts a MediaWiki XML dump into a git fast-import stream.

Run `parse` once to stream the dump and populate the sidecar stores, then\n\
`commit` to replay them into a linear commit history on stdout.";

#[derive(Parser, Debug)]
#[command(about = ABOUT)]
pub struct Cli {
    #[clap(flatten)]
    pub log_level: LogLevelArg,

    #[command(subcommand)]
    pub command: Commands,
}

const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct LogLevelArg {
    /// Use `-v` for debug or `-vv` for trace log messages.
    #[arg(long, short = 'v', global = true, default_value = "0", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use `-q` to hide info, `-qq` to hide warnings or `-qqq` to also hide error messages.
    #[arg(long, short = 'q', global = true, default_value = "0", action = clap::ArgAction::Count)]
    quiet: u8,
}

impl LogLevelArg {
    pub fn value(&self) -> anyhow::Result<log::LevelFilter> {
        let levels = log::LevelFilter::iter().collect_vec();
        let mut level_i16 = levels
            .iter()
            .find_position(|level| *level == &DEFAULT_LOG_LEVEL)
            .expect("default log level must be valid")
            .0 as i16;
        level_i16 += self.verbose as i16;
        level_i16 -= self.quiet as i16;
        if level_i16 < 0 {
            anyhow::bail!(
                "too quiet log level, {} below {}",
                -level_i16,
                levels.first().unwrap().as_str()
            );
        } else if level_i16 as usize >= levels.len() {
            anyhow::bail!(
                "too verbose log level, {} above {}",
                level_i16 as usize - levels.len() + 1,
                levels.last().unwrap().as_str()
            );
        } else {
            Ok(levels[level_i16 as usize])
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pass 1: stream a dump from stdin (or --input), emit a blob per
    /// revision/upload on stdout, and write the sidecar stores.
    Parse(ParseArgs),
    /// Pass 2: replay the sidecar stores written by `parse` into a linear
    /// commit history on stdout.
    Commit(CommitArgs),
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Directory holding the sidecar stores and the cross-pass state cache.
    /// Each store lives at a fixed filename under it unless overridden below.
    #[arg(long, default_value = "levitation-store")]
    pub store_dir: PathBuf,

    #[arg(long)]
    pub revisions_path: Option<PathBuf>,
    #[arg(long)]
    pub uploads_path: Option<PathBuf>,
    #[arg(long)]
    pub comments_path: Option<PathBuf>,
    #[arg(long)]
    pub users_path: Option<PathBuf>,
    #[arg(long)]
    pub pages_path: Option<PathBuf>,
    #[arg(long)]
    pub upload_comments_path: Option<PathBuf>,
    #[arg(long)]
    pub state_path: Option<PathBuf>,
}

impl StoreArgs {
    fn resolve(&self, override_path: &Option<PathBuf>, filename: &str) -> PathBuf {
        override_path
            .clone()
            .unwrap_or_else(|| self.store_dir.join(filename))
    }

    pub fn revisions(&self) -> PathBuf {
        self.resolve(&self.revisions_path, "import-meta")
    }
    pub fn uploads(&self) -> PathBuf {
        self.resolve(&self.uploads_path, "import-uplo")
    }
    pub fn comments(&self) -> PathBuf {
        self.resolve(&self.comments_path, "import-comm")
    }
    pub fn users(&self) -> PathBuf {
        self.resolve(&self.users_path, "import-user")
    }
    pub fn pages(&self) -> PathBuf {
        self.resolve(&self.pages_path, "import-page")
    }
    pub fn upload_comments(&self) -> PathBuf {
        self.resolve(&self.upload_comments_path, "import-upco")
    }
    pub fn state(&self) -> PathBuf {
        self.resolve(&self.state_path, "import-pkl")
    }
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    #[command(flatten)]
    pub stores: StoreArgs,

    /// Read the dump from this file instead of stdin.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Stop after this many `<page>` elements.
    #[arg(long)]
    pub max: Option<u32>,

    /// Truncate every sidecar store before parsing, instead of resuming a
    /// previous run.
    #[arg(long)]
    pub overwrite: bool,

    /// Accepted for compatibility with the original tool's backend switch;
    /// this implementation only ever streams with one parser.
    #[arg(long)]
    pub no_lxml: bool,
}

#[derive(Args, Debug)]
pub struct CommitArgs {
    #[command(flatten)]
    pub stores: StoreArgs,

    /// The ref every commit is appended to.
    #[arg(long, default_value = "refs/heads/master")]
    pub branch: String,

    /// Override the committer identity on every commit as `Name <email>`;
    /// otherwise each commit's wiki contributor is its own committer too.
    #[arg(long, value_parser = parse_identity)]
    pub committer: Option<(String, String)>,

    /// Use each revision's own timestamp as the committer time too, instead
    /// of the moment this command runs.
    #[arg(long)]
    pub wikitime: bool,

    /// Domain used to synthesize contributor email addresses; defaults to
    /// `git.<dump's base domain>` when omitted.
    #[arg(long)]
    pub author_domain: Option<String>,

    /// Emit commits ordered by revision timestamp instead of by id.
    #[arg(long)]
    pub sort: bool,

    /// Layout used to map page titles to file paths.
    #[arg(long, value_enum, default_value_t = DirectoryStructureArg::Levitation)]
    pub directory_structure: DirectoryStructureArg,

    /// How many of a title's leading code points get their own hex-encoded
    /// subdirectory under the `levitation` layout. Unused by `github`.
    #[arg(long, default_value_t = 2)]
    pub deepness: usize,

    /// Write the commit stream to this file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DirectoryStructureArg {
    Levitation,
    Github,
}

impl From<DirectoryStructureArg> for crate::path_builder::DirectoryStructure {
    fn from(value: DirectoryStructureArg) -> Self {
        match value {
            DirectoryStructureArg::Levitation => crate::path_builder::DirectoryStructure::Levitation,
            DirectoryStructureArg::Github => crate::path_builder::DirectoryStructure::Github,
        }
    }
}

fn parse_identity(raw: &str) -> Result<(String, String), String> {
    let (name, rest) = raw
        .split_once('<')
        .ok_or_else(|| format!("expected \"Name <email>\", got {raw:?}"))?;
    let email = rest
        .strip_suffix('>')
        .ok_or_else(|| format!("expected \"Name <email>\", got {raw:?}"))?;
    Ok((name.trim().to_string(), email.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_name_and_email_identity() {
        assert_eq!(
            parse_identity("Ada Lovelace <ada@example.org>").unwrap(),
            ("Ada Lovelace".to_string(), "ada@example.org".to_string())
        );
    }

    #[test]
    fn rejects_an_identity_missing_angle_brackets() {
        assert!(parse_identity("ada@example.org").is_err());
    }
}
