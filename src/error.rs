/// Errors raised while walking the dump or emitting the fast-import stream.
///
/// [`LevitationError::Cancelled`] is not a failure: it unwinds out of the
/// Pass 1 parse loop once `--max` pages have been imported and is caught by
/// the driver in [`crate::blob_writer`] before it ever reaches `main`.
#[derive(thiserror::Error, Debug)]
pub enum LevitationError {
    #[error("XML document needs to be in MediaWiki Export Format 0.10, found root in namespace {0:?}")]
    WrongNamespace(Option<String>),

    #[error("document root is <{0}>, expected <mediawiki>")]
    WrongRoot(String),

    #[error("more closing tags than opening tags while reading {0}")]
    TagUnderflow(String),

    #[error("expected only text content inside <{0}>, found a nested element")]
    UnexpectedElementChild(String),

    #[error("capture requested while another capture is already in progress")]
    NestedCapture,

    #[error("page termination requested while no page was in progress")]
    NoActivePage,

    #[error("page capture requested while a page was already in progress")]
    PageAlreadyActive,

    #[error("unknown directory structure {0:?}, expected \"levitation\" or \"github\"")]
    UnknownDirectoryStructure(String),

    #[error("malformed revision timestamp {0:?}")]
    BadTimestamp(String),

    #[error("malformed contributor IP address {0:?}")]
    BadIpAddress(String),

    #[error("reference to page {page_id} from revision {rev_id} has no recorded title")]
    DanglingPageReference { rev_id: u32, page_id: u32 },

    #[error("import cancelled after reaching the --max page cap")]
    Cancelled,

    #[error("state cache {0} is missing or has an unrecognized version header, rerun pass 1")]
    StaleStateCache(String),
}

impl LevitationError {
    /// True for the internal signal raised by `--max`, which `parse` absorbs
    /// silently rather than surfacing as a failure.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<LevitationError>(), Some(LevitationError::Cancelled))
    }
}
