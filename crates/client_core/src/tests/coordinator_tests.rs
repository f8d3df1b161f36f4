use super::*;
use async_trait::async_trait;
use shared::domain::{ProductId, ProductImage};
use tokio::{
    sync::{oneshot, Notify},
    time::{sleep, timeout, Instant},
};

struct PendingFetch {
    query: CatalogQuery,
    reply: oneshot::Sender<Result<CatalogPage, FetchFailure>>,
}

impl PendingFetch {
    fn respond(self, result: Result<CatalogPage, FetchFailure>) {
        let _ = self.reply.send(result);
    }

    fn ok(self, items: Vec<Product>) {
        self.ok_pages(items, 1);
    }

    fn ok_pages(self, items: Vec<Product>, total_pages: u32) {
        self.respond(Ok(CatalogPage { items, total_pages }));
    }
}

/// Hands every product fetch to the test, which decides when and how it
/// completes.
struct ScriptedGateway {
    labels: Result<Vec<Label>, FetchFailure>,
    /// When set, the vocabulary reply waits for one `notify_one`.
    label_gate: Option<Arc<Notify>>,
    calls: mpsc::UnboundedSender<PendingFetch>,
}

#[async_trait]
impl CatalogGateway for ScriptedGateway {
    async fn fetch_products(&self, query: &CatalogQuery) -> Result<CatalogPage, FetchFailure> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(PendingFetch {
                query: query.clone(),
                reply,
            })
            .map_err(|_| FetchFailure::network("test harness dropped"))?;
        rx.await
            .unwrap_or_else(|_| Err(FetchFailure::network("reply dropped")))
    }

    async fn fetch_labels(&self) -> Result<Vec<Label>, FetchFailure> {
        if let Some(gate) = &self.label_gate {
            gate.notified().await;
        }
        self.labels.clone()
    }

    async fn fetch_product(&self, id: shared::domain::ProductId) -> Result<Product, FetchFailure> {
        Err(FetchFailure::http(404, format!("cocktail {id} not scripted")))
    }

    async fn identity_present(&self) -> bool {
        false
    }
}

fn vocabulary() -> Vec<Label> {
    ["Sweet", "Sour", "Bitter"]
        .into_iter()
        .map(Label::named)
        .collect()
}

fn config(variant: ViewVariant) -> CoordinatorConfig {
    CoordinatorConfig {
        variant,
        drink_type_scope: None,
        page_size: 12,
        bulk_size: 100,
        search_debounce: Duration::from_millis(500),
    }
}

fn coordinator_with(
    config: CoordinatorConfig,
    labels: Result<Vec<Label>, FetchFailure>,
) -> (Arc<CatalogCoordinator>, mpsc::UnboundedReceiver<PendingFetch>) {
    let (calls, rx) = mpsc::unbounded_channel();
    let gateway = Arc::new(ScriptedGateway {
        labels,
        label_gate: None,
        calls,
    });
    (CatalogCoordinator::new(gateway, config), rx)
}

fn coordinator(
    variant: ViewVariant,
) -> (Arc<CatalogCoordinator>, mpsc::UnboundedReceiver<PendingFetch>) {
    coordinator_with(config(variant), Ok(vocabulary()))
}

fn product(id: i64, name: &str, abv: f64, labels: &[&str]) -> Product {
    Product {
        id: ProductId(id),
        name: name.to_string(),
        description: format!("{name} description"),
        alcohol_content: abv,
        rating: None,
        drink_type: None,
        in_stock: true,
        images: vec![ProductImage {
            url: format!("{id}.png"),
            is_thumbnail: true,
        }],
        labels: labels.iter().map(|name| Label::named(*name)).collect(),
        recipe: None,
    }
}

fn ids(items: &[Product]) -> Vec<i64> {
    items.iter().map(|p| p.id.0).collect()
}

async fn settled(view: &mut watch::Receiver<CatalogView>) -> CatalogView {
    view.wait_for(|v| !v.loading)
        .await
        .expect("view channel open")
        .clone()
}

async fn let_tasks_run() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn mounted_bulk(
    items: Vec<Product>,
) -> (
    Arc<CatalogCoordinator>,
    mpsc::UnboundedReceiver<PendingFetch>,
    watch::Receiver<CatalogView>,
) {
    let (coordinator, mut calls) = coordinator(ViewVariant::Bulk { in_stock: false });
    let mut view = coordinator.subscribe();
    coordinator.on_mount().await;
    calls.recv().await.expect("initial fetch").ok(items);
    settled(&mut view).await;
    (coordinator, calls, view)
}

#[tokio::test]
async fn mount_fetches_vocabulary_and_bulk_list_then_clears_loading() {
    let (coordinator, mut calls) = coordinator(ViewVariant::Bulk { in_stock: true });
    let mut view = coordinator.subscribe();

    coordinator.on_mount().await;
    assert!(coordinator.snapshot().loading);

    let initial = calls.recv().await.expect("initial fetch");
    assert_eq!(initial.query, CatalogQuery::bulk(100, true));
    initial.ok(vec![
        product(1, "Mojito", 12.0, &["Sweet"]),
        product(2, "Negroni", 24.0, &["Bitter"]),
    ]);

    let view = settled(&mut view).await;
    assert!(!view.error);
    assert_eq!(ids(&view.visible_items), vec![2, 1]);
    assert_eq!(view.labels, vocabulary());
    assert_eq!(view.total_pages, Some(1));
}

#[tokio::test]
async fn second_mount_is_ignored() {
    let (coordinator, mut calls) = coordinator(ViewVariant::Bulk { in_stock: false });
    coordinator.on_mount().await;
    coordinator.on_mount().await;

    calls.recv().await.expect("initial fetch").ok(Vec::new());
    let_tasks_run().await;
    assert!(calls.try_recv().is_err());
}

#[tokio::test]
async fn label_vocabulary_failure_flags_error_but_keeps_products() {
    let (coordinator, mut calls) = coordinator_with(
        config(ViewVariant::Bulk { in_stock: false }),
        Err(FetchFailure::network("connection refused")),
    );
    let mut view = coordinator.subscribe();
    coordinator.on_mount().await;
    calls
        .recv()
        .await
        .expect("initial fetch")
        .ok(vec![product(1, "Mojito", 12.0, &[])]);

    let view = settled(&mut view).await;
    assert!(view.error);
    assert!(view.labels.is_empty());
    assert_eq!(ids(&view.visible_items), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn typing_burst_issues_a_single_search() {
    let (coordinator, mut calls, _view) = mounted_bulk(Vec::new()).await;

    for text in ["g", "gi", "gin"] {
        coordinator.set_search_term(text).await;
        sleep(Duration::from_millis(100)).await;
    }

    let search = calls.recv().await.expect("search fetch");
    assert_eq!(search.query, CatalogQuery::search("gin"));

    let extra = timeout(Duration::from_secs(2), calls.recv()).await;
    assert!(extra.is_err(), "only one search expected");
}

#[tokio::test(start_paused = true)]
async fn late_response_for_superseded_search_is_discarded() {
    let (coordinator, mut calls, mut view) = mounted_bulk(Vec::new()).await;

    coordinator.set_search_term("gin").await;
    let gin = calls.recv().await.expect("gin fetch");
    coordinator.set_search_term("rum").await;
    let rum = calls.recv().await.expect("rum fetch");
    assert_eq!(rum.query, CatalogQuery::search("rum"));

    rum.ok(vec![product(20, "Daiquiri", 20.0, &[])]);
    let current = view
        .wait_for(|v| !v.loading && v.search_term == "rum")
        .await
        .expect("view")
        .clone();
    assert_eq!(ids(&current.visible_items), vec![20]);

    gin.ok(vec![product(10, "Gimlet", 25.0, &[])]);
    let_tasks_run().await;

    let after = coordinator.snapshot();
    assert_eq!(ids(&after.visible_items), vec![20]);
    assert_eq!(after.search_term, "rum");
    assert!(!after.loading);
}

#[tokio::test(start_paused = true)]
async fn empty_search_result_is_success() {
    let (coordinator, mut calls, mut view) =
        mounted_bulk(vec![product(1, "Mojito", 12.0, &[])]).await;

    coordinator.set_search_term("zzz").await;
    calls.recv().await.expect("search fetch").ok(Vec::new());

    let view = view
        .wait_for(|v| !v.loading && v.search_term == "zzz")
        .await
        .expect("view")
        .clone();
    assert!(view.visible_items.is_empty());
    assert!(!view.error);
    assert_eq!(view.total_pages, Some(1));
}

#[tokio::test(start_paused = true)]
async fn clearing_the_search_requeries_without_waiting() {
    let (coordinator, mut calls, mut view) = mounted_bulk(Vec::new()).await;

    coordinator.set_search_term("gin").await;
    calls
        .recv()
        .await
        .expect("search fetch")
        .ok(vec![product(10, "Gimlet", 25.0, &[])]);
    view.wait_for(|v| !v.loading && v.search_term == "gin")
        .await
        .expect("view");

    let before = Instant::now();
    coordinator.set_search_term("   ").await;
    let base = calls.recv().await.expect("base fetch");
    assert_eq!(Instant::now(), before);
    assert_eq!(base.query, CatalogQuery::bulk(100, false));
    assert_eq!(coordinator.snapshot().search_term, "");
}

#[tokio::test]
async fn failure_keeps_previous_list_and_sets_error() {
    let (coordinator, mut calls, mut view) = mounted_bulk(vec![
        product(1, "Mojito", 12.0, &[]),
        product(2, "Negroni", 24.0, &[]),
    ])
    .await;

    coordinator.refresh().await;
    assert!(coordinator.snapshot().loading);
    calls
        .recv()
        .await
        .expect("refresh fetch")
        .respond(Err(FetchFailure::http(500, "boom")));

    let failed = view.wait_for(|v| v.error).await.expect("view").clone();
    assert!(!failed.loading);
    assert_eq!(ids(&failed.visible_items), vec![2, 1]);
    assert!(failed
        .error_detail
        .as_deref()
        .is_some_and(|detail| detail.contains("500")));

    coordinator.refresh().await;
    calls
        .recv()
        .await
        .expect("retry fetch")
        .ok(vec![product(3, "Paloma", 10.0, &[])]);
    let recovered = view
        .wait_for(|v| !v.loading && !v.error)
        .await
        .expect("view")
        .clone();
    assert_eq!(ids(&recovered.visible_items), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn failed_search_keeps_paging_the_bulk_list_locally() {
    let items: Vec<Product> = (1..=13)
        .map(|id| product(id, &format!("Cocktail {id}"), 100.0 - id as f64, &[]))
        .collect();
    let (coordinator, mut calls, mut view) = mounted_bulk(items).await;

    coordinator.set_search_term("gin").await;
    calls
        .recv()
        .await
        .expect("search fetch")
        .respond(Err(FetchFailure::network("offline")));
    let failed = view.wait_for(|v| v.error).await.expect("view").clone();
    assert_eq!(failed.search_term, "gin");
    assert_eq!(failed.visible_items.len(), 12);
    assert_eq!(failed.total_pages, Some(2));

    coordinator.set_sort_key(SortKey::Name).await;
    let sorted = coordinator.snapshot();
    assert_eq!(sorted.visible_items.len(), 12);
    assert_eq!(sorted.total_pages, Some(2));

    coordinator.set_page(2).await;
    let second = coordinator.snapshot();
    assert_eq!(second.page, 2);
    assert_eq!(second.visible_items.len(), 1);

    let_tasks_run().await;
    assert!(calls.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn loading_holds_until_label_vocabulary_arrives() {
    let gate = Arc::new(Notify::new());
    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let gateway = Arc::new(ScriptedGateway {
        labels: Ok(vocabulary()),
        label_gate: Some(Arc::clone(&gate)),
        calls: calls_tx,
    });
    let coordinator =
        CatalogCoordinator::new(gateway, config(ViewVariant::Bulk { in_stock: false }));
    let mut view = coordinator.subscribe();
    coordinator.on_mount().await;
    let initial = calls.recv().await.expect("initial fetch");

    coordinator.set_search_term("gin").await;
    calls
        .recv()
        .await
        .expect("search fetch")
        .ok(vec![product(10, "Gimlet", 25.0, &[])]);
    let searched = view
        .wait_for(|v| !v.visible_items.is_empty())
        .await
        .expect("view")
        .clone();
    assert!(searched.loading);
    assert!(searched.labels.is_empty());

    initial.ok(vec![product(1, "Mojito", 12.0, &[])]);
    gate.notify_one();
    let mounted = settled(&mut view).await;
    assert_eq!(mounted.labels, vocabulary());
    assert_eq!(ids(&mounted.visible_items), vec![10]);
    assert_eq!(mounted.search_term, "gin");
}

#[tokio::test]
async fn bulk_label_filter_is_local_and_matches_any_label() {
    let (coordinator, mut calls, _view) = mounted_bulk(vec![
        product(1, "Daiquiri", 20.0, &["Sweet"]),
        product(2, "Whiskey Sour", 18.0, &["Sour"]),
        product(3, "Negroni", 24.0, &["Bitter"]),
    ])
    .await;

    coordinator.set_selected_labels(["Sweet", "Sour"]).await;
    let view = coordinator.snapshot();
    assert_eq!(ids(&view.visible_items), vec![1, 2]);

    coordinator.set_sort_key(SortKey::Name).await;
    assert_eq!(ids(&coordinator.snapshot().visible_items), vec![1, 2]);

    coordinator.set_selected_labels(Vec::<String>::new()).await;
    assert_eq!(ids(&coordinator.snapshot().visible_items), vec![1, 3, 2]);

    let_tasks_run().await;
    assert!(calls.try_recv().is_err(), "bulk view must not refetch");
}

#[tokio::test]
async fn local_pagination_clamps_out_of_range_pages() {
    let items: Vec<Product> = (1..=13)
        .map(|id| product(id, &format!("Cocktail {id}"), 100.0 - id as f64, &[]))
        .collect();
    let (coordinator, _calls, _view) = mounted_bulk(items).await;

    let first = coordinator.snapshot();
    assert_eq!(ids(&first.visible_items), (1..=12).collect::<Vec<_>>());
    assert_eq!(first.total_pages, Some(2));

    coordinator.set_page(2).await;
    assert_eq!(ids(&coordinator.snapshot().visible_items), vec![13]);

    coordinator.set_page(3).await;
    let clamped_high = coordinator.snapshot();
    assert_eq!(clamped_high.page, 2);
    assert_eq!(ids(&clamped_high.visible_items), vec![13]);

    coordinator.set_page(0).await;
    let clamped_low = coordinator.snapshot();
    assert_eq!(clamped_low.page, 1);
    assert_eq!(clamped_low.visible_items.len(), 12);
}

#[tokio::test]
async fn scope_filter_is_applied_to_every_derivation() {
    let mut shot = product(1, "Kamikaze", 30.0, &[]);
    shot.drink_type = Some(DrinkType::new("shot"));
    let mut long = product(2, "Tom Collins", 10.0, &[]);
    long.drink_type = Some(DrinkType::new("long_drink"));

    let (coordinator, mut calls) = coordinator_with(
        config(ViewVariant::Bulk { in_stock: false }).with_scope(Some(DrinkType::new("shot"))),
        Ok(vocabulary()),
    );
    let mut view = coordinator.subscribe();
    coordinator.on_mount().await;
    calls.recv().await.expect("initial fetch").ok(vec![shot, long]);

    let view = settled(&mut view).await;
    assert_eq!(ids(&view.visible_items), vec![1]);
    assert_eq!(
        coordinator.query_state().await.drink_type_scope,
        Some(DrinkType::new("shot"))
    );
}

#[tokio::test]
async fn paged_view_requeries_for_labels_pages_and_sort() {
    let (coordinator, mut calls) = coordinator(ViewVariant::Paged);
    let mut view = coordinator.subscribe();
    coordinator.on_mount().await;

    let initial = calls.recv().await.expect("initial fetch");
    assert_eq!(
        initial.query,
        CatalogQuery::paged(1, 12, SortKey::AlcoholContent)
    );
    initial.ok_pages(vec![product(1, "Mojito", 12.0, &["Sweet"])], 3);
    assert_eq!(settled(&mut view).await.total_pages, Some(3));

    coordinator.set_selected_labels(["Sweet"]).await;
    let labeled = calls.recv().await.expect("labeled fetch");
    assert_eq!(
        labeled.query,
        CatalogQuery::labeled(vec!["Sweet".into()], 1, 12, SortKey::AlcoholContent)
    );
    labeled.ok_pages(vec![product(1, "Mojito", 12.0, &["Sweet"])], 3);
    settled(&mut view).await;

    coordinator.set_page(9).await;
    let last_page = calls.recv().await.expect("page fetch");
    assert_eq!(last_page.query.page, Some(3));
    assert_eq!(last_page.query.labels, vec!["Sweet".to_string()]);
    last_page.ok_pages(vec![product(7, "Cosmopolitan", 20.0, &["Sweet"])], 3);
    let view_after_page = settled(&mut view).await;
    assert_eq!(view_after_page.page, 3);
    assert_eq!(ids(&view_after_page.visible_items), vec![7]);

    coordinator.set_sort_key(SortKey::Name).await;
    let sorted = calls.recv().await.expect("sort fetch");
    assert_eq!(sorted.query.sort_key, Some(SortKey::Name));
    assert_eq!(sorted.query.page, Some(1));
}

#[tokio::test]
async fn search_only_view_starts_empty_and_clears_on_empty_term() {
    let (coordinator, mut calls) = coordinator(ViewVariant::SearchOnly);
    let mut view = coordinator.subscribe();
    coordinator.on_mount().await;

    let mounted = settled(&mut view).await;
    assert_eq!(mounted.labels, vocabulary());
    assert!(mounted.visible_items.is_empty());
    assert!(calls.try_recv().is_err());

    coordinator.set_search_term("").await;
    let_tasks_run().await;
    assert!(calls.try_recv().is_err());
}

#[tokio::test]
async fn unmount_ignores_in_flight_response() {
    let (coordinator, mut calls) = coordinator(ViewVariant::Bulk { in_stock: false });
    coordinator.on_mount().await;
    let initial = calls.recv().await.expect("initial fetch");

    coordinator.on_unmount().await;
    initial.ok(vec![product(1, "Mojito", 12.0, &[])]);
    let_tasks_run().await;

    let view = coordinator.snapshot();
    assert!(view.visible_items.is_empty());
    assert!(!view.loading);
    assert!(coordinator.store().await.items.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unmount_cancels_pending_search() {
    let (coordinator, mut calls, _view) = mounted_bulk(Vec::new()).await;

    coordinator.set_search_term("gin").await;
    coordinator.on_unmount().await;
    coordinator.set_sort_key(SortKey::Rating).await;

    let late = timeout(Duration::from_secs(2), calls.recv()).await;
    assert!(late.is_err(), "no request may follow unmount");
    assert_eq!(coordinator.query_state().await.sort_key, SortKey::AlcoholContent);
}
