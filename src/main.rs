use anyhow::Context as _;
use anyhow::Result;
use clap::Parser as _;
use git_levitation::blob_writer::BlobWriter;
use git_levitation::blob_writer::BlobWriterConfig;
use git_levitation::blob_writer::BlobWriterStores;
use git_levitation::cli::Cli;
use git_levitation::cli::CommitArgs;
use git_levitation::cli::Commands;
use git_levitation::cli::ParseArgs;
use git_levitation::cli::StoreArgs;
use git_levitation::committer::Committer;
use git_levitation::committer::CommitterConfig;
use git_levitation::committer::CommitterStores;
use git_levitation::error::LevitationError;
use git_levitation::fastimport::FastImportWriter;
use git_levitation::log as levitation_log;
use git_levitation::path_builder::PathBuilder;
use git_levitation::state::GlobalState;
use git_levitation::store::MetaStore;
use git_levitation::store::StringStore;
use git_levitation::xml_source::XmlEventSource;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.log_level.value() {
        Ok(level) => level,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    levitation_log::init(level);

    match &cli.command {
        Commands::Parse(args) => run_parse(args),
        Commands::Commit(args) => run_commit(args),
    }
    .map(|()| ExitCode::SUCCESS)
    .unwrap_or_else(|err| {
        log::error!("{err:#}");
        ExitCode::FAILURE
    })
}

fn open_parse_stores(stores: &StoreArgs, overwrite: bool) -> Result<BlobWriterStores> {
    if let Some(parent) = stores.revisions().parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating sidecar directory {}", parent.display()))?;
    }
    let mut result = BlobWriterStores {
        revisions: MetaStore::open(stores.revisions())?,
        uploads: MetaStore::open(stores.uploads())?,
        comments: StringStore::open(stores.comments())?,
        users: StringStore::open(stores.users())?,
        pages: StringStore::open(stores.pages())?,
        upload_comments: StringStore::open(stores.upload_comments())?,
    };
    if overwrite {
        result.revisions.clear()?;
        result.uploads.clear()?;
        result.comments.clear()?;
        result.users.clear()?;
        result.pages.clear()?;
        result.upload_comments.clear()?;
    }
    Ok(result)
}

fn open_commit_stores(stores: &StoreArgs) -> Result<CommitterStores> {
    Ok(CommitterStores {
        revisions: MetaStore::open(stores.revisions())?,
        uploads: MetaStore::open(stores.uploads())?,
        comments: StringStore::open(stores.comments())?,
        users: StringStore::open(stores.users())?,
        pages: StringStore::open(stores.pages())?,
        upload_comments: StringStore::open(stores.upload_comments())?,
    })
}

fn run_parse(args: &ParseArgs) -> Result<()> {
    let store_dir = &args.stores.store_dir;
    std::fs::create_dir_all(store_dir)
        .with_context(|| format!("creating sidecar directory {}", store_dir.display()))?;
    let stores = open_parse_stores(&args.stores, args.overwrite)?;

    let input: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("opening dump {}", path.display()))?,
        ),
        None => Box::new(std::io::stdin()),
    };
    let source = XmlEventSource::new(BufReader::new(input));

    let writer = FastImportWriter::new(std::io::stdout());
    let config = BlobWriterConfig {
        max_pages: args.max,
    };
    let blob_writer = BlobWriter::new(writer, stores, config);

    let (state, _stores, mut writer) = match blob_writer.run(source) {
        Ok(result) => result,
        Err(err) if LevitationError::is_cancellation(&err) => {
            log::info!("stopped early: reached the --max page cap");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    writer.progress(&format!(
        "parsed {} pages, {} revisions, {} uploads",
        state.max_page_id, state.max_rev_id, state.max_upload_id
    ))?;

    state.save(args.stores.state())?;
    log::info!(
        "wrote sidecar stores to {} and state cache to {}",
        store_dir.display(),
        args.stores.state().display()
    );
    Ok(())
}

fn run_commit(args: &CommitArgs) -> Result<()> {
    let state = GlobalState::load(args.stores.state())
        .with_context(|| "load the state cache written by `parse` before running `commit`")?;
    let stores = open_commit_stores(&args.stores)?;
    let path_builder = PathBuilder::new(args.directory_structure.into(), args.deepness);
    let config = CommitterConfig {
        branch: args.branch.clone(),
        committer_override: args.committer.clone(),
        use_wikitime: args.wikitime,
        author_domain: args.author_domain.clone(),
        sort_by_epoch: args.sort,
    };

    let import_time = chrono::Utc::now().timestamp();
    let count = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            let writer = FastImportWriter::new(file);
            let committer = Committer::new(writer, stores, state, config, path_builder, import_time);
            committer.run()?
        }
        None => {
            let writer = FastImportWriter::new(std::io::stdout());
            let committer = Committer::new(writer, stores, state, config, path_builder, import_time);
            committer.run()?
        }
    };
    log::info!("wrote {count} commits");
    Ok(())
}
