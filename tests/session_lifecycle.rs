//! Session lifecycle tests: uploads, submissions, and failure handling,
//! driven against a scripted assistant that records every call.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use doc_chat::assistant::{Assistant, AssistantFactory};
use doc_chat::error::{IngestionError, NoticeKind, QueryError};
use doc_chat::models::{SubmitOutcome, UploadOutcome, UploadedDocument};
use doc_chat::progress::{Activity, ActivityReporter};
use doc_chat::session::Session;
use doc_chat::staging::Stager;

/// Bytes that make the scripted assistant fail ingestion.
const CORRUPT: &[u8] = b"corrupt";

#[derive(Default)]
struct Log {
    /// Path and the bytes found there at ingestion time.
    ingested: Vec<(PathBuf, Vec<u8>)>,
    asked: Vec<String>,
    created: usize,
    cleared: usize,
}

struct Scripted {
    log: Arc<Mutex<Log>>,
    answer: String,
    docs: usize,
}

#[async_trait]
impl Assistant for Scripted {
    async fn ingest(&mut self, location: &Path) -> Result<(), IngestionError> {
        let bytes = std::fs::read(location).expect("staged file exists during ingest");
        let corrupt = bytes == CORRUPT;
        self.log
            .lock()
            .unwrap()
            .ingested
            .push((location.to_path_buf(), bytes));
        if corrupt {
            return Err(IngestionError::Backend("cannot parse document".to_string()));
        }
        self.docs += 1;
        Ok(())
    }

    async fn ask(&mut self, query: &str) -> Result<String, QueryError> {
        self.log.lock().unwrap().asked.push(query.to_string());
        if self.docs == 0 {
            return Err(QueryError::EmptyKnowledgeBase);
        }
        Ok(self.answer.clone())
    }

    fn clear(&mut self) {
        self.docs = 0;
        self.log.lock().unwrap().cleared += 1;
    }
}

fn scripted_factory(log: Arc<Mutex<Log>>, answer: &str) -> Arc<dyn AssistantFactory> {
    let answer = answer.to_string();
    Arc::new(move || -> anyhow::Result<Box<dyn Assistant>> {
        log.lock().unwrap().created += 1;
        Ok(Box::new(Scripted {
            log: log.clone(),
            answer: answer.clone(),
            docs: 0,
        }))
    })
}

fn session_with(answer: &str) -> (Session, Arc<Mutex<Log>>) {
    let log = Arc::new(Mutex::new(Log::default()));
    let session = Session::start(scripted_factory(log.clone(), answer), Stager::default())
        .expect("session starts");
    (session, log)
}

fn pairs(session: &Session) -> Vec<(String, bool)> {
    session
        .transcript()
        .iter()
        .map(|t| (t.text.clone(), t.is_user))
        .collect()
}

fn turn(text: &str, is_user: bool) -> (String, bool) {
    (text.to_string(), is_user)
}

#[tokio::test]
async fn successful_submit_appends_question_then_answer() {
    let (mut session, _log) = session_with("It says X.");
    session
        .handle_upload(&[UploadedDocument::new("a.pdf", b"a".to_vec())])
        .await;

    let outcome = session.handle_message_submit("  Summarize it \n").await;

    assert_eq!(outcome, SubmitOutcome::Answered("It says X.".to_string()));
    assert_eq!(
        pairs(&session),
        vec![turn("Summarize it", true), turn("It says X.", false)]
    );
}

#[tokio::test]
async fn blank_submissions_are_ignored() {
    let (mut session, log) = session_with("unused");
    for raw in ["", "   ", "\n\t "] {
        assert_eq!(
            session.handle_message_submit(raw).await,
            SubmitOutcome::Ignored
        );
    }
    assert!(session.transcript().is_empty());
    assert!(log.lock().unwrap().asked.is_empty());
}

#[tokio::test]
async fn question_without_upload_stays_unanswered() {
    let (mut session, log) = session_with("unused");

    let outcome = session
        .handle_message_submit("What is the refund policy?")
        .await;

    match outcome {
        SubmitOutcome::Unanswered(notice) => {
            assert_eq!(notice.kind, NoticeKind::Query);
            assert!(notice.message.contains("no documents"));
        }
        other => panic!("expected unanswered, got {:?}", other),
    }
    assert_eq!(
        pairs(&session),
        vec![turn("What is the refund policy?", true)]
    );
    assert_eq!(log.lock().unwrap().asked, vec!["What is the refund policy?"]);
}

#[tokio::test]
async fn report_upload_then_summary() {
    let (mut session, log) = session_with("It says X.");

    let outcome = session
        .handle_upload(&[UploadedDocument::new("report.pdf", b"%PDF-1.4 report".to_vec())])
        .await;
    assert_eq!(
        outcome,
        UploadOutcome::Completed {
            ingested: vec!["report.pdf".to_string()],
            notices: Vec::new(),
        }
    );
    assert!(session.transcript().is_empty());

    session.handle_message_submit("Summarize it").await;
    assert_eq!(
        pairs(&session),
        vec![turn("Summarize it", true), turn("It says X.", false)]
    );
    assert_eq!(log.lock().unwrap().ingested[0].1, b"%PDF-1.4 report");
}

#[tokio::test]
async fn upload_resets_transcript_and_replaces_assistant() {
    let (mut session, log) = session_with("answer");
    session
        .handle_upload(&[UploadedDocument::new("a.pdf", b"a".to_vec())])
        .await;
    session.handle_message_submit("first question").await;
    assert_eq!(session.transcript().len(), 2);

    session
        .handle_upload(&[UploadedDocument::new("b.pdf", CORRUPT.to_vec())])
        .await;

    assert!(session.transcript().is_empty());
    let log = log.lock().unwrap();
    // initial session + two uploads
    assert_eq!(log.created, 3);
    assert_eq!(log.cleared, 2);
}

#[tokio::test]
async fn failed_upload_still_leaves_empty_transcript() {
    let (mut session, _log) = session_with("answer");
    session
        .handle_upload(&[UploadedDocument::new("a.pdf", b"a".to_vec())])
        .await;
    session.handle_message_submit("hello").await;

    let outcome = session
        .handle_upload(&[UploadedDocument::new("bad.pdf", CORRUPT.to_vec())])
        .await;

    assert_eq!(outcome.notices().len(), 1);
    assert!(session.transcript().is_empty());
    // Knowledge from the earlier batch is gone.
    assert!(matches!(
        session.handle_message_submit("hello again").await,
        SubmitOutcome::Unanswered(_)
    ));
}

#[tokio::test]
async fn failing_document_does_not_stop_the_batch() {
    let (mut session, log) = session_with("answer");
    let documents = vec![
        UploadedDocument::new("one.pdf", b"first document".to_vec()),
        UploadedDocument::new("two.pdf", CORRUPT.to_vec()),
        UploadedDocument::new("three.pdf", vec![0u8, 159, 146, 150, 255]),
    ];

    let outcome = session.handle_upload(&documents).await;

    let UploadOutcome::Completed { ingested, notices } = outcome else {
        panic!("upload aborted");
    };
    assert_eq!(ingested, vec!["one.pdf", "three.pdf"]);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Ingestion);
    assert_eq!(notices[0].document.as_deref(), Some("two.pdf"));

    let log = log.lock().unwrap();
    assert_eq!(log.ingested.len(), 3, "every document is attempted in order");
    for ((path, bytes), doc) in log.ingested.iter().zip(&documents) {
        assert_eq!(bytes, &doc.bytes, "bytes preserved for {}", doc.name);
        assert!(!path.exists(), "{} was not released", path.display());
    }
    let mut paths: Vec<&PathBuf> = log.ingested.iter().map(|(p, _)| p).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 3, "staged locations are unique");
}

#[tokio::test]
async fn empty_upload_still_resets() {
    let (mut session, _log) = session_with("answer");
    session
        .handle_upload(&[UploadedDocument::new("a.pdf", b"a".to_vec())])
        .await;
    session.handle_message_submit("question").await;

    let outcome = session.handle_upload(&[]).await;

    assert_eq!(
        outcome,
        UploadOutcome::Completed {
            ingested: Vec::new(),
            notices: Vec::new(),
        }
    );
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn reset_failure_aborts_upload_and_session_survives() {
    let log = Arc::new(Mutex::new(Log::default()));
    let inner = scripted_factory(log.clone(), "answer");
    let builds = AtomicUsize::new(0);
    // The first build (session start) works; every later one fails.
    let factory = move || -> anyhow::Result<Box<dyn Assistant>> {
        if builds.fetch_add(1, Ordering::SeqCst) > 0 {
            anyhow::bail!("model server unreachable");
        }
        inner.create()
    };
    let mut session = Session::start(Arc::new(factory), Stager::default()).unwrap();

    let outcome = session
        .handle_upload(&[UploadedDocument::new("a.pdf", b"a".to_vec())])
        .await;

    let UploadOutcome::Aborted(notice) = outcome else {
        panic!("expected aborted upload");
    };
    assert_eq!(notice.kind, NoticeKind::Reset);
    assert!(notice.message.contains("model server unreachable"));
    assert!(log.lock().unwrap().ingested.is_empty());
    assert!(!session.is_initialized());

    let outcome = session.handle_message_submit("still there?").await;
    assert!(matches!(outcome, SubmitOutcome::Unanswered(ref n) if n.message.contains("unavailable")));
    assert_eq!(pairs(&session), vec![turn("still there?", true)]);
}

#[tokio::test]
async fn transcript_reads_are_stable() {
    let (mut session, _log) = session_with("answer");
    session
        .handle_upload(&[UploadedDocument::new("a.pdf", b"a".to_vec())])
        .await;
    session.handle_message_submit("q1").await;
    session.handle_message_submit("q2").await;

    let first = session.transcript().to_vec();
    let second = session.transcript().to_vec();
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[tokio::test]
async fn init_is_idempotent() {
    let (mut session, log) = session_with("answer");
    session.handle_message_submit("q").await;
    session.init().unwrap();

    assert_eq!(log.lock().unwrap().created, 1);
    assert_eq!(session.transcript().len(), 1);
}

struct Recording(Mutex<Vec<Activity>>);

impl ActivityReporter for Recording {
    fn report(&self, activity: Activity) {
        self.0.lock().unwrap().push(activity);
    }
}

#[tokio::test]
async fn activity_is_reported_around_assistant_calls() {
    let (session, _log) = session_with("answer");
    let recording = Arc::new(Recording(Mutex::new(Vec::new())));
    let mut session = session.with_activity(recording.clone());

    session
        .handle_upload(&[
            UploadedDocument::new("a.pdf", b"a".to_vec()),
            UploadedDocument::new("b.pdf", b"b".to_vec()),
        ])
        .await;
    session.handle_message_submit("question").await;

    let events = recording.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            Activity::Ingesting {
                document: "a.pdf".to_string(),
                n: 1,
                total: 2
            },
            Activity::Ingesting {
                document: "b.pdf".to_string(),
                n: 2,
                total: 2
            },
            Activity::Idle,
            Activity::Thinking,
            Activity::Idle,
        ]
    );
}

#[tokio::test]
async fn rag_assistant_answers_from_uploaded_text() {
    let factory = doc_chat::rag::factory(&doc_chat::config::Config::minimal()).unwrap();
    let mut session = Session::start(factory, Stager::default()).unwrap();

    let outcome = session
        .handle_upload(&[
            UploadedDocument::new(
                "policy.txt",
                b"Orders ship within two business days.\n\nRefunds are issued within 30 days of purchase.".to_vec(),
            ),
            UploadedDocument::new("empty.txt", b"   ".to_vec()),
        ])
        .await;
    assert_eq!(outcome.notices().len(), 1);
    assert_eq!(outcome.notices()[0].document.as_deref(), Some("empty.txt"));

    let outcome = session
        .handle_message_submit("How are refunds issued?")
        .await;
    assert_eq!(
        outcome,
        SubmitOutcome::Answered("Refunds are issued within 30 days of purchase.".to_string())
    );
}

/// A one-page PDF with each line of `lines` drawn in Courier.
fn one_page_pdf(lines: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("TL", vec![16.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[tokio::test]
async fn pdf_upload_is_answered_by_default_assistant() {
    let config = doc_chat::config::Config::minimal();
    let factory = doc_chat::rag::factory(&config).unwrap();
    let mut session = Session::start(factory, Stager::default()).unwrap();
    let pdf = one_page_pdf(&["Refunds are issued within 30 days."]);
    assert!(config.upload.accepts("report.pdf"));

    let outcome = session
        .handle_upload(&[UploadedDocument::new("report.pdf", pdf)])
        .await;
    assert_eq!(
        outcome,
        UploadOutcome::Completed {
            ingested: vec!["report.pdf".to_string()],
            notices: Vec::new(),
        }
    );

    let SubmitOutcome::Answered(answer) = session.handle_message_submit("Summarize it").await
    else {
        panic!("expected an answer from the PDF");
    };
    assert!(answer.contains("Refunds are issued within 30 days"), "{:?}", answer);
    assert_eq!(session.transcript().len(), 2);
}
