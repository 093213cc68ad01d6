//! Chat pane behavior against scripted completion services.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::stream;
use tokio_test::{assert_pending, task};

use chatpane::{
    ChatPane, Chunk, ChunkStream, CompletionRequest, CompletionService, Effect, Error, KnownModel,
    Model, PaneOptions, Pull, Result, Role, SessionState, TokenCounter,
};

struct WordCounter;

impl TokenCounter for WordCounter {
    fn encoding_name(&self) -> &str {
        "words"
    }

    fn count(&self, text: &str) -> u64 {
        text.split_whitespace().count() as u64
    }
}

enum Reply {
    Chunks(Vec<Result<Chunk>>),
    Refuse,
    Hang,
}

#[derive(Default)]
struct Scripted {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Scripted {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CompletionService for Scripted {
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Chunks(items)) => Ok(Box::pin(stream::iter(items))),
            Some(Reply::Hang) => Ok(Box::pin(stream::pending::<Result<Chunk>>())),
            Some(Reply::Refuse) | None => Err(Error::connection("connection refused", None)),
        }
    }
}

fn texts(items: &[&str]) -> Reply {
    Reply::Chunks(items.iter().map(|t| Ok(Chunk::text(*t))).collect())
}

fn pane_with(service: Arc<Scripted>, options: PaneOptions) -> ChatPane {
    ChatPane::new(service, Arc::new(WordCounter), options)
}

fn pane(service: Arc<Scripted>) -> ChatPane {
    pane_with(service, PaneOptions::default())
}

/// Pull until the pane stops asking, collecting every effect.
async fn drive(pane: &mut ChatPane, mut effects: Vec<Effect>) -> Vec<Effect> {
    let mut seen = Vec::new();
    while effects.iter().any(Effect::is_pull_next) {
        seen.append(&mut effects);
        let Some(pull) = pane.pull().await else {
            break;
        };
        effects = pane.handle_pull(pull);
    }
    seen.append(&mut effects);
    seen
}

fn renders(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Render(_)))
        .count()
}

fn reports(effects: &[Effect]) -> Vec<&Error> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Report(err) => Some(err),
            _ => None,
        })
        .collect()
}

fn transcript(pane: &ChatPane) -> Vec<String> {
    pane.refresh()
        .text
        .lines
        .iter()
        .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
        .collect()
}

#[tokio::test]
async fn streamed_reply_is_committed_once() {
    let service = Scripted::new(vec![texts(&["Hel", "lo", ""])]);
    let mut pane = pane(service.clone());

    let submitted = pane.submit("say hello");
    assert_eq!(submitted.len(), 2);
    assert!(matches!(submitted[0], Effect::Render(_)));
    assert!(submitted[1].is_pull_next());
    assert!(pane.is_streaming());

    let effects = drive(&mut pane, submitted).await;
    // One echo of the prompt, one per chunk, one final refresh.
    assert_eq!(renders(&effects), 5);
    let commits: Vec<_> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::Committed(summary) => Some(summary),
            _ => None,
        })
        .collect();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].delta, 3);

    assert!(!pane.is_streaming());
    assert_eq!(pane.state(), SessionState::Idle);
    let history = pane.history().as_slice();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].role(), Role::System);
    assert_eq!(history[1].content(), "say hello");
    assert_eq!(history[2].role(), Role::Assistant);
    assert_eq!(history[2].content(), "Hello");
    assert_eq!(pane.snapshot().turns, 1);
    assert_eq!(pane.snapshot().used, 3);
    assert!(pane.pull().await.is_none());
}

#[tokio::test]
async fn request_replays_the_whole_conversation() {
    let service = Scripted::new(vec![texts(&["one"]), texts(&["two"])]);
    let mut pane = pane(service.clone());

    let effects = pane.submit("first");
    drive(&mut pane, effects).await;
    pane.set_model(Model::Known(KnownModel::Gpt4o));
    let effects = pane.submit("second");
    drive(&mut pane, effects).await;

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, Model::Known(KnownModel::Gpt35Turbo));
    assert_eq!(requests[1].model, Model::Known(KnownModel::Gpt4o));
    assert_eq!(requests[1].seed, Some(1));
    assert!(requests[1].stream);
    let contents: Vec<&str> = requests[1].messages.iter().map(|m| m.content()).collect();
    assert_eq!(
        contents,
        vec!["You are a helpful assistant.", "first", "one", "second"]
    );
    assert_eq!(pane.snapshot().turns, 2);
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let service = Scripted::new(vec![]);
    let mut pane = pane(service.clone());
    assert!(pane.submit("   \n").is_empty());
    assert_eq!(pane.history().len(), 1);
    assert!(service.requests().is_empty());
}

#[tokio::test]
async fn input_while_streaming_is_rejected() {
    let service = Scripted::new(vec![Reply::Hang]);
    let mut pane = pane(service.clone());
    pane.submit("first");

    let effects = pane.submit("second");
    let errors = reports(&effects);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_busy());
    assert_eq!(pane.history().len(), 2);
    assert_eq!(pane.history().last().unwrap().content(), "first");
    assert!(pane.is_streaming());
}

#[tokio::test]
async fn rejected_input_does_not_split_the_reply() {
    let service = Scripted::new(vec![texts(&["Hel", "lo world"])]);
    let mut pane = pane(service);
    pane.submit("hi");

    let pull = pane.pull().await.unwrap();
    pane.handle_pull(pull);
    let effects = pane.submit("again");
    let errors = reports(&effects);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("type /cancel"));
    pane.note(&errors[0].to_string());

    let effects = vec![Effect::PullNext];
    drive(&mut pane, effects).await;
    assert_eq!(pane.history().last().unwrap().content(), "Hello world");

    let lines = transcript(&pane);
    let reply = lines.iter().position(|l| l == "Hello world");
    let busy = lines.iter().position(|l| l.starts_with("Busy:"));
    assert!(reply.is_some(), "reply should render on one line: {lines:?}");
    assert!(busy > reply, "note should follow the reply: {lines:?}");
    assert!(!lines.iter().any(|l| l == "Hel" || l == "lo world"));
}

#[tokio::test]
async fn pull_waits_without_blocking() {
    let service = Scripted::new(vec![Reply::Hang]);
    let mut pane = pane(service);
    pane.submit("anyone there?");

    {
        let mut pull = task::spawn(pane.pull());
        assert_pending!(pull.poll());
        assert_pending!(pull.poll());
    }

    let effects = pane.cancel();
    let errors = reports(&effects);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_abort());
    assert!(!pane.is_streaming());
    assert!(pane.pull().await.is_none());
    assert_eq!(pane.history().count_role(Role::Assistant), 0);
    assert_eq!(pane.snapshot().turns, 0);
}

#[tokio::test]
async fn cancel_mid_reply_commits_nothing() {
    let service = Scripted::new(vec![Reply::Chunks(vec![
        Ok(Chunk::text("Half")),
        Ok(Chunk::text(" done")),
    ])]);
    let mut pane = pane(service);
    pane.submit("go");

    let pull = pane.pull().await.unwrap();
    assert!(matches!(pull, Pull::Chunk(_)));
    pane.handle_pull(pull);
    assert_eq!(pane.state(), SessionState::Streaming);

    pane.cancel();
    assert_eq!(pane.history().count_role(Role::Assistant), 0);
    assert!(pane.cancel().is_empty());
}

#[tokio::test]
async fn refused_request_keeps_the_user_message() {
    let service = Scripted::new(vec![Reply::Refuse, texts(&["back"])]);
    let mut pane = pane(service);

    let effects = pane.submit("hello?");
    let effects = drive(&mut pane, effects).await;
    let errors = reports(&effects);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_stream_acquisition());
    assert!(!pane.is_streaming());
    assert_eq!(pane.history().len(), 2);
    assert_eq!(pane.snapshot().turns, 0);

    let effects = pane.submit("retry");
    drive(&mut pane, effects).await;
    assert_eq!(pane.history().last().unwrap().content(), "back");
    assert_eq!(pane.snapshot().turns, 1);
}

#[tokio::test]
async fn mid_stream_failure_reports_partial_text() {
    let service = Scripted::new(vec![Reply::Chunks(vec![
        Ok(Chunk::text("Par")),
        Ok(Chunk::text("tial")),
        Err(Error::streaming("connection reset", None)),
    ])]);
    let mut pane = pane(service);

    let effects = pane.submit("tell me");
    let effects = drive(&mut pane, effects).await;
    let errors = reports(&effects);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_stream_read());
    assert_eq!(errors[0].partial_reply(), Some("Partial"));
    assert_eq!(pane.history().count_role(Role::Assistant), 0);
    assert_eq!(pane.snapshot().turns, 0);
    assert!(pane.refresh().text.lines.iter().any(|line| {
        line.spans.iter().any(|span| span.content.contains("Partial"))
    }));
}

#[tokio::test]
async fn budget_overflow_is_not_clamped() {
    let service = Scripted::new(vec![texts(&["far too many words here"])]);
    let options = PaneOptions {
        budget: 2,
        ..PaneOptions::default()
    };
    let mut pane = pane_with(service, options);

    let effects = pane.submit("hi");
    drive(&mut pane, effects).await;
    let snapshot = pane.snapshot();
    assert_eq!(snapshot.used, 6);
    assert_eq!(snapshot.remaining, -4);
    assert!(snapshot.percent_used > 100.0);
}

#[tokio::test]
async fn shutdown_releases_the_stream() {
    let service = Scripted::new(vec![Reply::Hang]);
    let mut pane = pane(service);
    pane.submit("wait");
    pane.shutdown();
    assert!(!pane.is_streaming());
    assert!(pane.pull().await.is_none());
    assert_eq!(pane.history().count_role(Role::Assistant), 0);
}

#[tokio::test]
async fn context_tokens_cover_the_history() {
    let service = Scripted::new(vec![texts(&["two words"])]);
    let mut pane = pane(service);
    // "You are a helpful assistant."
    assert_eq!(pane.context_tokens(), 5);
    let effects = pane.submit("three more words");
    drive(&mut pane, effects).await;
    assert_eq!(pane.context_tokens(), 10);
    assert_eq!(pane.encoding_name(), "words");
}
