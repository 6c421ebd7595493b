mod common;

use anyhow::bail;
use pretty_assertions::assert_eq;
use ragchat::prompts::DEFAULT_REFUSAL;
use ragchat::{RagError, Role, Stage, Turn, TurnEvent};

use common::{answer_context, latest_user_text, FakeEmbedder, FakeIndex, FakeLlm, Fakes};

const HEAP_NOTES: &str = "A binary heap is a complete binary tree stored in an array.";

fn heap_fakes() -> Fakes {
    Fakes::new(
        FakeLlm::grounded("heap"),
        FakeEmbedder::new(),
        FakeIndex::with_passages(&[HEAP_NOTES]),
    )
}

#[tokio::test(flavor = "current_thread")]
async fn first_question_is_searched_verbatim() {
    let fakes = heap_fakes();
    let mut session = fakes.session();

    let outcome = session.chat_turn("  What is a binary heap?  ").await.unwrap();

    assert_eq!(outcome.standalone_query, "What is a binary heap?");
    assert!(!outcome.was_rewritten("What is a binary heap?"));
    assert_eq!(outcome.answer, "Grounded answer about heap.");
    assert_eq!(outcome.passages, 1);
    assert_eq!(
        session.history().snapshot(),
        &[
            Turn::user("What is a binary heap?"),
            Turn::model("Grounded answer about heap."),
        ]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn each_turn_adds_exactly_user_then_model() {
    let fakes = Fakes::new(
        FakeLlm::new(|request| {
            if answer_context(request).is_some() {
                return Ok("Insertion into a binary heap is O(log n).".into());
            }
            if request.conversation.len() > 1 {
                return Ok("What is the time complexity of inserting into a binary heap?".into());
            }
            Ok(latest_user_text(request))
        }),
        FakeEmbedder::new(),
        FakeIndex::with_passages(&[HEAP_NOTES]),
    );
    let mut session = fakes.session();

    session.chat_turn("What is a binary heap?").await.unwrap();
    assert_eq!(session.history().len(), 2);

    let outcome = session.chat_turn("and insertion?").await.unwrap();
    assert!(outcome.was_rewritten("and insertion?"));
    assert_eq!(session.history().len(), 4);

    let turns = session.history().snapshot();
    let roles: Vec<Role> = turns.iter().map(Turn::role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::User, Role::Model]);
    assert_eq!(
        turns[2].text(),
        "What is the time complexity of inserting into a binary heap?"
    );

    // The rewrite call saw the prior exchange plus the raw follow-up, which
    // never reached the stored history.
    let conversations = fakes.llm.conversations.lock().unwrap();
    assert_eq!(conversations[2].len(), 3);
    assert_eq!(conversations[2][2], Turn::user("and insertion?"));
    assert!(turns.iter().all(|turn| turn.text() != "and insertion?"));
}

#[tokio::test(flavor = "current_thread")]
async fn context_joins_passages_in_rank_order() {
    let fakes = Fakes::new(
        FakeLlm::new(|request| match answer_context(request) {
            Some(context) => Ok(context.to_string()),
            None => Ok(latest_user_text(request)),
        }),
        FakeEmbedder::new(),
        FakeIndex::with_passages(&["A", "B", "C"]),
    );
    let mut session = fakes.session();

    let outcome = session.chat_turn("letters?").await.unwrap();
    assert_eq!(outcome.context, "A\n\n---\n\nB\n\n---\n\nC");
    assert_eq!(outcome.answer, outcome.context);
    assert_eq!(outcome.passages, 3);
}

#[tokio::test(flavor = "current_thread")]
async fn unrelated_context_returns_exact_refusal() {
    let fakes = Fakes::new(
        FakeLlm::grounded("red-black"),
        FakeEmbedder::new(),
        FakeIndex::with_passages(&["Bubble sort repeatedly swaps adjacent elements."]),
    );
    let mut session = fakes.session();

    let outcome = session
        .chat_turn("How does a red-black tree rebalance?")
        .await
        .unwrap();
    assert_eq!(outcome.answer, DEFAULT_REFUSAL);
    assert_eq!(session.history().snapshot()[1], Turn::model(DEFAULT_REFUSAL));
}

#[tokio::test(flavor = "current_thread")]
async fn blank_question_touches_nothing() {
    let fakes = heap_fakes();
    let mut session = fakes.session();

    let err = session.chat_turn(" \t\n").await.unwrap_err();
    assert!(matches!(err, RagError::EmptyQuestion));
    assert!(session.history().is_empty());
    assert_eq!(fakes.total_calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn retrieval_failure_restores_history() {
    let fakes = Fakes::new(
        FakeLlm::grounded("heap"),
        FakeEmbedder::failing(),
        FakeIndex::with_passages(&[HEAP_NOTES]),
    );
    let mut session = fakes.session();

    let err = session.chat_turn("What is a heap?").await.unwrap_err();
    match err {
        RagError::ServiceCall { stage, message } => {
            assert_eq!(stage, Stage::Retrieving);
            assert!(message.contains("429"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(session.history().is_empty());
    assert_eq!(fakes.llm.calls(), 1);
    assert_eq!(fakes.index.calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn generation_failure_restores_history() {
    let fakes = Fakes::new(
        FakeLlm::new(|request| {
            if answer_context(request).is_some() {
                bail!("Gemini returned 500 Internal Server Error");
            }
            Ok(latest_user_text(request))
        }),
        FakeEmbedder::new(),
        FakeIndex::with_passages(&[HEAP_NOTES]),
    );
    let mut session = fakes.session();

    let err = session.chat_turn("What is a heap?").await.unwrap_err();
    assert!(matches!(
        err,
        RagError::ServiceCall {
            stage: Stage::Generating,
            ..
        }
    ));
    assert!(err.to_string().starts_with("generating failed:"));
    assert!(session.history().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn history_survives_a_failed_follow_up() {
    let fakes = Fakes::new(
        FakeLlm::new(|request| {
            if request.conversation.len() > 1 && answer_context(request).is_none() {
                bail!("quota exceeded");
            }
            match answer_context(request) {
                Some(_) => Ok("A heap is a tree.".into()),
                None => Ok(latest_user_text(request)),
            }
        }),
        FakeEmbedder::new(),
        FakeIndex::with_passages(&[HEAP_NOTES]),
    );
    let mut session = fakes.session();

    session.chat_turn("What is a heap?").await.unwrap();
    let before = session.history().to_vec();

    let err = session.chat_turn("and its height?").await.unwrap_err();
    assert!(matches!(
        err,
        RagError::ServiceCall {
            stage: Stage::Rewriting,
            ..
        }
    ));
    assert_eq!(session.history().snapshot(), before.as_slice());
}

#[tokio::test(flavor = "current_thread")]
async fn history_window_caps_turns_sent_to_the_model() {
    let fakes = heap_fakes();
    let mut session = fakes.session_with_window(Some(2));

    for question in ["heap one", "heap two", "heap three", "heap four"] {
        session.chat_turn(question).await.unwrap();
    }

    assert_eq!(session.history().len(), 8);
    let conversations = fakes.llm.conversations.lock().unwrap();
    let sent: Vec<usize> = conversations.iter().map(Vec::len).collect();
    // Rewrite and answer calls alternate; both carry at most two stored turns
    // plus the question being handled.
    assert_eq!(sent, vec![1, 1, 3, 3, 3, 3, 3, 3]);
    assert_eq!(conversations[4][2], Turn::user("heap three"));
    assert_eq!(conversations[5][2], Turn::user("heap three"));
    assert_eq!(conversations[6][0], Turn::user("heap three"));
}

#[tokio::test(flavor = "current_thread")]
async fn stage_events_arrive_in_order() {
    let fakes = Fakes::new(
        FakeLlm::new(|request| match answer_context(request) {
            Some(_) => Ok("answer".into()),
            None => Ok("What is a Fibonacci heap?".into()),
        }),
        FakeEmbedder::new(),
        FakeIndex::with_passages(&[HEAP_NOTES]),
    );
    let mut session = fakes.session();
    let mut events = Vec::new();

    session
        .chat_turn_observed("fib heap?", |event| events.push(event))
        .await
        .unwrap();

    assert_eq!(
        events,
        vec![
            TurnEvent::Rewritten("What is a Fibonacci heap?".into()),
            TurnEvent::Retrieving,
            TurnEvent::Generating,
        ]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn reset_forgets_the_conversation() {
    let fakes = heap_fakes();
    let mut session = fakes.session();
    session.chat_turn("What is a heap?").await.unwrap();
    assert!(!session.history().is_empty());

    session.reset();
    assert!(session.history().is_empty());
}
