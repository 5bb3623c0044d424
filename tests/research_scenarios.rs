//! End-to-end runs of the research engine against scripted capabilities.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deep_research::config::ResearchSettings;
use deep_research::llm::{ChatMessage, LlmError};
use deep_research::research::{
    normalize_url, ProgressSink, ResearchError, ResearchPlan, Researcher, StopReason,
};
use deep_research::search::MockSearch;
use deep_research::testing::{hit, ScriptedLlm, ScriptedSearch};
use tokio_util::sync::CancellationToken;

fn settings() -> ResearchSettings {
    ResearchSettings {
        max_rounds: 5,
        parallelism: 4,
        min_results: 1000,
        delay: Duration::ZERO,
        max_pages: 0,
        ..ResearchSettings::default()
    }
}

fn plan(queries: impl IntoIterator<Item = String>) -> ResearchPlan {
    ResearchPlan {
        understanding_summary: "find rentals".to_string(),
        expected_outcome: "a list of flats with prices".to_string(),
        search_queries: queries.into_iter().collect(),
        ..ResearchPlan::default()
    }
}

fn last_prompt(messages: &[ChatMessage]) -> &str {
    messages.last().map(|m| m.content.as_str()).unwrap_or("")
}

fn reporting_llm() -> Arc<ScriptedLlm> {
    Arc::new(ScriptedLlm::from_fn(|messages| {
        if last_prompt(messages).starts_with("Write a research report") {
            Ok("# Findings\n\nSee sources.".to_string())
        } else {
            Ok("summary".to_string())
        }
    }))
}

#[tokio::test]
async fn cancellation_mid_run_returns_partial_report() {
    let first_round: Vec<String> = (1..=4).map(|i| format!("first {i}")).collect();
    let mut search = ScriptedSearch::new();
    for (i, q) in first_round.iter().enumerate() {
        let results = (0..3)
            .map(|j| hit(&format!("flat {i}-{j}"), &format!("http://flats.com/{i}/{j}")))
            .collect();
        search = search.with_pages(q, vec![results]);
    }
    search = search.with_pages("second", vec![vec![hit("late", "http://flats.com/late")]]);

    let mut s = settings();
    s.delay = Duration::from_millis(100);
    s.max_pages = 1;
    let progress = ProgressSink::new();
    let researcher = Researcher::new(reporting_llm(), Arc::new(search), s).with_progress(progress.clone());

    let cancel = CancellationToken::new();
    let mut events = progress.subscribe();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event.message.starts_with("Round 1 complete") {
                trigger.cancel();
                break;
            }
        }
    });

    let mut queries = first_round.clone();
    queries.extend(std::iter::repeat("second".to_string()).take(4));
    let result = researcher.run("flats", &plan(queries), &cancel).await.unwrap();

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert!(result.is_partial());
    assert_eq!(result.sources.len(), 12);
    assert!(!result.report.is_empty());
}

#[tokio::test]
async fn cancellation_during_page_delay_keeps_sources_so_far() {
    let mut search = ScriptedSearch::new();
    let queries: Vec<String> = ["a", "b"].map(String::from).to_vec();
    for q in &queries {
        let pages = (1..=50)
            .map(|i| vec![hit(&format!("{q} flat {i}"), &format!("http://slow.com/{q}/{i}"))])
            .collect();
        search = search.with_pages(q, pages);
    }

    let report_prompt = Arc::new(Mutex::new(String::new()));
    let seen = report_prompt.clone();
    let llm = Arc::new(ScriptedLlm::from_fn(move |messages| {
        let prompt = last_prompt(messages);
        if prompt.starts_with("Write a research report") {
            if let Ok(mut seen) = seen.lock() {
                *seen = prompt.to_string();
            }
            return Ok("# Partial".to_string());
        }
        Ok("summary".to_string())
    }));

    let mut s = settings();
    s.parallelism = 2;
    s.delay = Duration::from_millis(40);
    let progress = ProgressSink::new();
    let mut events = progress.subscribe();
    let researcher = Researcher::new(llm, Arc::new(search), s).with_progress(progress);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });
    let result = researcher.run("flats", &plan(queries), &cancel).await.unwrap();

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(result.stats.rounds, 1);
    assert!(
        result.sources.len() >= 2 && result.sources.len() < 100,
        "got {} sources",
        result.sources.len()
    );
    assert_eq!(result.sources.len(), result.stats.new_urls);
    assert_eq!(result.report, "# Partial");

    let prompt = report_prompt.lock().unwrap().clone();
    for source in &result.sources {
        assert!(prompt.contains(&source.url), "{} missing from report data", source.url);
    }
    while let Ok(event) = events.try_recv() {
        assert!(!event.message.starts_with("Round 1 complete"));
    }
}

#[tokio::test]
async fn dedup_invariant_holds_across_rounds() {
    let mut search = ScriptedSearch::new();
    let mut total = 0;
    let mut distinct = HashSet::new();
    let queries: Vec<String> = (0..8).map(|i| format!("q{i}")).collect();
    for (i, q) in queries.iter().enumerate() {
        // overlapping URLs, with tracking and trailing slash variants
        let pages: Vec<Vec<_>> = (0..3)
            .map(|p| {
                vec![
                    hit("a", &format!("http://s.com/{}", (i + p) % 5)),
                    hit("b", &format!("http://s.com/{}/?utm_source=x", (i * p) % 7)),
                ]
            })
            .collect();
        for page in &pages {
            for r in page {
                total += 1;
                distinct.insert(normalize_url(&r.url));
            }
        }
        search = search.with_pages(q, pages);
    }

    let researcher = Researcher::new(reporting_llm(), Arc::new(search), settings());
    let result = researcher
        .run("flats", &plan(queries), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.stop_reason, StopReason::QueriesExhausted);
    assert_eq!(result.sources.len(), distinct.len());
    assert_eq!(result.stats.new_urls + result.stats.duplicates, total);
    let unique: HashSet<_> = result.sources.iter().map(|s| normalize_url(&s.url)).collect();
    assert_eq!(unique.len(), result.sources.len());
}

#[tokio::test]
async fn run_stops_once_min_results_reached() {
    let mut s = settings();
    s.parallelism = 1;
    s.min_results = 10;
    let researcher = Researcher::new(reporting_llm(), Arc::new(MockSearch::with_last_page(10)), s);

    let queries = ["one", "two", "three"].map(String::from);
    let result = researcher
        .run("mock", &plan(queries), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.stop_reason, StopReason::TargetReached);
    assert_eq!(result.stats.rounds, 1);
    assert_eq!(result.sources.len(), 10);
}

#[tokio::test]
async fn mock_provider_yields_only_duplicates_after_first_query() {
    let mut s = settings();
    s.parallelism = 1;
    s.max_rounds = 3;
    let researcher = Researcher::new(reporting_llm(), Arc::new(MockSearch::with_last_page(4)), s);

    let queries = ["one", "two", "three"].map(String::from);
    let result = researcher
        .run("mock", &plan(queries), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.stop_reason, StopReason::RoundsExhausted);
    assert_eq!(result.sources.len(), 4);
    assert_eq!(result.stats.duplicates, 8);
}

#[tokio::test]
async fn report_ladder_recovers_from_context_overflow() {
    // 1000 tokens -> 3500 chars: round compression above 1750, report ceiling 1750
    let llm = Arc::new(ScriptedLlm::from_fn(|messages| {
        let prompt = last_prompt(messages);
        if prompt.starts_with("Compress") {
            return Ok(format!("compressed facts http://flats.com {}", "f".repeat(400)));
        }
        if prompt.starts_with("Write a research report") {
            if prompt.len() > 700 {
                return Err(LlmError::context_overflow(
                    Some(400),
                    "This model's maximum context length is 1000 tokens".to_string(),
                ));
            }
            return Ok("# Short report".to_string());
        }
        Ok("summary".to_string())
    }));

    let long_snippet = "x".repeat(200);
    let mut search = ScriptedSearch::new();
    let queries: Vec<String> = (0..4).map(|i| format!("q{i}")).collect();
    for (i, q) in queries.iter().enumerate() {
        let mut result = hit("flat", &format!("http://flats.com/{i}"));
        result.content = long_snippet.clone();
        search = search.with_pages(q, vec![vec![result]]);
    }

    let mut s = settings();
    s.context_length = 1000;
    let researcher = Researcher::new(llm.clone(), Arc::new(search), s);
    let result = researcher
        .run("flats", &plan(queries), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.report, "# Short report");
    assert_eq!(result.sources.len(), 4);
}

#[tokio::test]
async fn report_ladder_gives_up_after_three_attempts() {
    let llm = Arc::new(ScriptedLlm::from_fn(|messages| {
        if last_prompt(messages).starts_with("Write a research report") {
            return Err(LlmError::context_overflow(Some(400), "context window exceeded".to_string()));
        }
        Ok("summary".to_string())
    }));
    let search = ScriptedSearch::new().with_pages("q", vec![vec![hit("a", "http://a.com")]]);

    let researcher = Researcher::new(llm, Arc::new(search), settings());
    let err = researcher
        .run("flats", &plan(["q".to_string()]), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ResearchError::Report { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(source.is_budget_related());
        }
        other => panic!("unexpected error: {other}"),
    }
}
