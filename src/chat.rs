//! Interactive terminal chat.
//!
//! Uploads the files given on the command line, then reads questions from
//! stdin. Answers go to stdout; notices and activity go to stderr.
//!
//! | Input | Effect |
//! |-------|--------|
//! | `<text>` | Ask a question |
//! | `/upload <file>...` | Replace the session's documents |
//! | `/reset` | Clear the transcript and all documents |
//! | `/quit` | Exit |

use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::models::{SubmitOutcome, UploadOutcome, UploadedDocument};
use crate::progress::ProgressMode;
use crate::rag;
use crate::session::Session;
use crate::staging::Stager;

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Reset,
    Upload(Vec<&'a str>),
    Message(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    let (head, rest) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, ""), |(head, rest)| (head, rest.trim()));
    match head {
        "/quit" | "/exit" => Command::Quit,
        "/reset" => Command::Reset,
        "/upload" => Command::Upload(rest.split_whitespace().collect()),
        _ => Command::Message(line),
    }
}

pub async fn run_chat(config: &Config, files: &[PathBuf], progress: ProgressMode) -> Result<()> {
    let factory = rag::factory(config)?;
    let stager = Stager::new(
        config.upload.staging_dir.clone(),
        Some(config.upload.max_document_bytes),
    );
    let mut session =
        Session::start(factory, stager)?.with_activity(Arc::from(progress.reporter()));

    if !files.is_empty() {
        upload(&mut session, config, files).await;
    }
    println!("Ask a question about your documents (/upload <files>, /reset, /quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Quit => break,
            Command::Reset => {
                report_upload(&session.handle_upload(&[]).await);
                println!("Session cleared.");
            }
            Command::Upload(paths) => {
                let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
                upload(&mut session, config, &paths).await;
            }
            Command::Message(text) => match session.handle_message_submit(text).await {
                SubmitOutcome::Ignored => {}
                SubmitOutcome::Answered(answer) => println!("{}", answer),
                SubmitOutcome::Unanswered(notice) => eprintln!("{}", notice),
            },
        }
        prompt();
    }
    Ok(())
}

async fn upload(session: &mut Session, config: &Config, paths: &[PathBuf]) {
    let documents = read_documents(config, paths);
    report_upload(&session.handle_upload(&documents).await);
}

/// Read accepted files from disk, skipping (with a message) anything else.
fn read_documents(config: &Config, paths: &[PathBuf]) -> Vec<UploadedDocument> {
    let mut documents = Vec::new();
    for path in paths {
        let name = display_name(path);
        if !config.upload.accepts(&name) {
            eprintln!(
                "skipping {}: accepted types are {}",
                name,
                config.upload.accepted_extensions.join(", ")
            );
            continue;
        }
        match std::fs::read(path) {
            Ok(bytes) => documents.push(UploadedDocument::new(name, bytes)),
            Err(e) => eprintln!("skipping {}: {}", path.display(), e),
        }
    }
    documents
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn report_upload(outcome: &UploadOutcome) {
    if let UploadOutcome::Completed { ingested, .. } = outcome {
        for name in ingested {
            println!("ingested {}", name);
        }
    }
    for notice in outcome.notices() {
        eprintln!("{}", notice);
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
