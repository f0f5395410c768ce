//! Command-line inspector for the standards store.
//!
//! # Responsibility
//! - Verify `standards_core` linkage with deterministic output.
//! - Optionally list documents of a database file, or print one document's
//!   outline in pre-order.
//!
//! Usage: `standards_cli [DB_PATH [DOCUMENT_ID]]`. Set `STANDARDS_LOG_DIR`
//! to an absolute directory to write core logs there.

use log::info;
use standards_core::{
    open_db, DocumentId, DocumentRegistry, SqliteDocumentRepository, SqliteTreeRepository,
    StoreError, StoreResult,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("standards_core ping={}", standards_core::ping());
    println!("standards_core version={}", standards_core::core_version());

    if let Ok(log_dir) = std::env::var("STANDARDS_LOG_DIR") {
        if let Err(err) = standards_core::init_logging(standards_core::default_log_level(), &log_dir)
        {
            eprintln!("logging disabled: {err}");
        }
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(db_path) = args.first() else {
        return ExitCode::SUCCESS;
    };

    match run(db_path, args.get(1).map(String::as_str)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error ({:?}): {err}", err.kind());
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: &str, document_id: Option<&str>) -> StoreResult<()> {
    let conn = open_db(db_path)?;
    let registry = DocumentRegistry::new(
        SqliteDocumentRepository::try_new(&conn)?,
        SqliteTreeRepository::try_new(&conn)?,
    );
    info!("event=cli_inspect module=cli status=start");

    let Some(raw_id) = document_id else {
        for document in registry.list(None)? {
            println!(
                "{}\t{}\t{}\ttree_version={}",
                document.id,
                document.metadata.jurisdiction,
                document.metadata.name,
                document.tree_version
            );
        }
        return Ok(());
    };

    let document_id = DocumentId::parse(raw_id).map_err(StoreError::from)?;
    let document = registry.get(&document_id)?;
    println!("{} ({})", document.metadata.title, document.metadata.name);
    for node in registry.nodes(&document_id)? {
        let text = if node.attributes.title.is_empty() {
            &node.attributes.description
        } else {
            &node.attributes.title
        };
        println!("{}{} {}", "  ".repeat(node.depth()), node.label(), text);
    }
    Ok(())
}
