use super::*;
use crate::test_support::{service_over, starter_catalog, FixtureTransport};
use std::time::Duration;

struct Harness {
    orchestrator: Arc<Orchestrator>,
    transport: Arc<FixtureTransport>,
    seen: Arc<Mutex<Vec<RenderEvent>>>,
}

fn harness(transport: FixtureTransport, page_size: u32) -> Harness {
    let transport = Arc::new(transport);
    let orchestrator = Orchestrator::new(
        Arc::new(service_over(transport.clone())),
        SearchController::new(Duration::from_millis(300)),
        FilterController::new(),
        PaginationController::new(page_size),
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    for topic in [
        RenderTopic::Loading,
        RenderTopic::Rendered,
        RenderTopic::NoResults,
        RenderTopic::Error,
    ] {
        let sink = Arc::clone(&seen);
        orchestrator.render_events().subscribe(topic, move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
    }

    Harness {
        orchestrator,
        transport,
        seen,
    }
}

fn names(event: &RenderEvent) -> Vec<String> {
    match event {
        RenderEvent::Rendered(result) => result
            .items
            .iter()
            .map(|entity| entity.name().to_string())
            .collect(),
        other => panic!("expected a rendered page, got {other:?}"),
    }
}

#[tokio::test]
async fn initial_load_renders_the_first_page() {
    let h = harness(FixtureTransport::new(starter_catalog()), 4);

    let event = h.orchestrator.load_initial().await.expect("resolved");

    assert_eq!(
        names(&event),
        vec!["bulbasaur", "ivysaur", "charmander", "charizard"]
    );
    let seen = h.seen.lock().unwrap();
    assert_eq!(
        seen[0],
        RenderEvent::Loading {
            message: "Loading Pokemon...".to_string()
        }
    );
    assert_eq!(seen.len(), 2);
    assert_eq!(h.orchestrator.pagination().total_pages(), 2);
    assert_eq!(
        h.orchestrator.stats(),
        OrchestratorStats {
            displayed: 4,
            total_count: 6,
            cache_size: 5,
            is_loading: false,
        }
    );
}

#[tokio::test]
async fn search_takes_precedence_over_filters() {
    let h = harness(FixtureTransport::new(starter_catalog()), 50);

    h.orchestrator.filters().toggle_type("fire");
    h.orchestrator.search().submit("pika");
    assert_eq!(h.orchestrator.query_state().strategy(), Strategy::Search);

    assert!(h.orchestrator.process_pending().await);
    assert_eq!(
        names(h.seen.lock().unwrap().last().unwrap()),
        vec!["pikachu"]
    );
    // Both updates were coalesced into that single resolution.
    assert!(!h.orchestrator.process_pending().await);
}

#[tokio::test]
async fn clearing_the_search_falls_back_to_active_filters() {
    let h = harness(FixtureTransport::new(starter_catalog()), 50);

    h.orchestrator.filters().toggle_type("fire");
    h.orchestrator.search().submit("pika");
    h.orchestrator.search().clear();
    assert_eq!(h.orchestrator.query_state().strategy(), Strategy::Filter);

    assert!(h.orchestrator.process_pending().await);
    assert_eq!(
        names(h.seen.lock().unwrap().last().unwrap()),
        vec!["charmander", "charizard"]
    );
}

#[tokio::test]
async fn filter_changes_reset_pagination_to_the_first_page() {
    let h = harness(FixtureTransport::new(starter_catalog()), 2);
    h.orchestrator.load_initial().await;

    assert!(h.orchestrator.pagination().go_to_page(2));
    h.orchestrator.process_pending().await;
    assert_eq!(
        names(h.seen.lock().unwrap().last().unwrap()),
        vec!["charmander", "charizard"]
    );

    h.orchestrator.filters().toggle_type("electric");
    assert_eq!(h.orchestrator.query_state().page, 1);
    assert_eq!(h.orchestrator.pagination().current_page(), 1);

    h.orchestrator.process_pending().await;
    assert_eq!(
        names(h.seen.lock().unwrap().last().unwrap()),
        vec!["pikachu", "raichu"]
    );
    assert_eq!(h.orchestrator.pagination().total_pages(), 1);
}

#[tokio::test]
async fn page_changes_keep_the_active_search() {
    let h = harness(FixtureTransport::new(starter_catalog()), 4);

    h.orchestrator.search().submit("a");
    h.orchestrator.process_pending().await;
    assert_eq!(h.orchestrator.pagination().total_pages(), 2);

    assert!(h.orchestrator.pagination().go_to_page(2));
    let state = h.orchestrator.query_state();
    assert_eq!(state.search_query, "a");
    assert_eq!(state.page, 2);

    h.orchestrator.process_pending().await;
    assert_eq!(
        names(h.seen.lock().unwrap().last().unwrap()),
        vec!["pikachu", "raichu"]
    );
}

#[tokio::test]
async fn empty_outcome_publishes_no_results() {
    let h = harness(FixtureTransport::new(starter_catalog()), 50);

    h.orchestrator.search().submit("zzzznotfound");
    h.orchestrator.process_pending().await;

    assert_eq!(
        h.seen.lock().unwrap().last(),
        Some(&RenderEvent::NoResults)
    );
    assert_eq!(h.orchestrator.pagination().total_pages(), 1);
}

#[tokio::test]
async fn call_level_failure_publishes_an_error_and_keeps_the_view() {
    let h = harness(FixtureTransport::new(starter_catalog()), 4);
    let first = h.orchestrator.load_initial().await.expect("resolved");
    let rendered = names(&first);
    assert_eq!(h.orchestrator.stats().displayed, 4);

    h.transport.fail_list_from_now(CatalogError::http_status("pokemon list", 500));
    let event = h.orchestrator.refresh().await.expect("resolved");

    match event {
        RenderEvent::Error { message } => assert!(message.starts_with("Loading failed:")),
        other => panic!("expected an error, got {other:?}"),
    }
    let kept: Vec<String> = h
        .orchestrator
        .current_items()
        .iter()
        .map(|entity| entity.name().to_string())
        .collect();
    assert_eq!(kept, rendered);
    let stats = h.orchestrator.stats();
    assert_eq!(stats.displayed, 4);
    assert_eq!(stats.total_count, 6);
    assert!(!stats.is_loading);
    assert!(matches!(
        h.seen.lock().unwrap().last(),
        Some(RenderEvent::Error { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn results_for_a_superseded_query_are_discarded() {
    let h = harness(
        FixtureTransport::new(starter_catalog()).with_delay(Duration::from_millis(50)),
        50,
    );
    h.orchestrator.search().submit("char");

    let (stale, ()) = tokio::join!(h.orchestrator.resolve(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.orchestrator.search().submit("pika");
    });
    assert_eq!(stale, None);

    assert!(h.orchestrator.process_pending().await);
    assert_eq!(
        names(h.seen.lock().unwrap().last().unwrap()),
        vec!["pikachu"]
    );
}

#[tokio::test]
async fn refresh_refetches_after_clearing_the_cache() {
    let h = harness(FixtureTransport::new(starter_catalog()), 2);
    h.orchestrator.load_initial().await;
    h.orchestrator.load_initial().await;
    assert_eq!(h.transport.calls_for("entity:1"), 1);

    h.orchestrator.refresh().await;
    assert_eq!(h.transport.calls_for("entity:1"), 2);
    assert_eq!(h.orchestrator.current_items().len(), 2);
    assert_eq!(
        h.orchestrator
            .entity_by_id(EntityId(2))
            .map(|entity| entity.name().to_string()),
        Some("ivysaur".to_string())
    );
}

#[tokio::test]
async fn run_loop_resolves_queued_updates_until_destroyed() {
    let h = harness(FixtureTransport::new(starter_catalog()), 50);
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.orchestrator
        .render_events()
        .subscribe(RenderTopic::Rendered, move |event| {
            let _ = tx.send(event.clone());
            Ok(())
        });

    let runner = tokio::spawn(Arc::clone(&h.orchestrator).run());
    h.orchestrator.search().submit("raichu");

    let rendered = rx.recv().await.expect("rendered");
    assert_eq!(names(&rendered), vec!["raichu"]);

    h.orchestrator.destroy();
    runner.await.expect("run loop exits");
}

#[tokio::test]
async fn destroyed_orchestrator_ignores_controller_events() {
    let h = harness(FixtureTransport::new(starter_catalog()), 50);
    h.orchestrator.destroy();
    h.orchestrator.destroy();

    h.orchestrator.search().submit("mew");

    assert_eq!(h.orchestrator.query_state().search_query, "");
    assert!(!h.orchestrator.process_pending().await);
    assert_eq!(
        h.orchestrator
            .search()
            .events()
            .handler_count(SearchTopic::Query),
        0
    );
}
