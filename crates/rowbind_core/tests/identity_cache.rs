mod common;

use common::{dummy_attributes, row_count, CountingDriver, Dummy};
use rowbind_core::{
    shared, BindOptions, EvictionPolicy, OrmError, Params, Query, Repository, RowId,
};
use std::rc::Rc;

async fn bind_counting(options: BindOptions) -> (CountingDriver, Repository<Dummy, CountingDriver>) {
    let driver = CountingDriver::in_memory();
    let repo = Repository::bind(driver.clone(), "dummy", dummy_attributes(), options)
        .await
        .unwrap();
    (driver, repo)
}

async fn seed(repo: &Repository<Dummy, CountingDriver>, count: usize) {
    for n in 1..=count {
        repo.save(&shared(Dummy::new(&format!("Bazinga {n}"))))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn repeated_fetches_return_the_same_instance() {
    let (_driver, repo) = bind_counting(BindOptions::default()).await;
    seed(&repo, 2).await;
    repo.release_all();

    let first = repo
        .get("SELECT * FROM dummy WHERE id = ?1", Params::positional([2_i64]))
        .await
        .unwrap()
        .unwrap();
    let listed = repo.all("SELECT * FROM dummy", Params::None).await.unwrap();
    let by_id = repo.get_by_id(2).await.unwrap().unwrap();

    assert!(Rc::ptr_eq(&first, &listed[1]));
    assert!(Rc::ptr_eq(&first, &by_id));
}

#[tokio::test]
async fn get_by_id_fetches_once_then_serves_from_cache() {
    let (driver, repo) = bind_counting(BindOptions::default()).await;
    seed(&repo, 4).await;

    repo.release_all();
    assert_eq!(repo.cached_len(), 0);
    let fetches_before = driver.stats.fetches();

    let first = repo.get_by_id(2).await.unwrap().unwrap();
    assert_eq!(driver.stats.fetches(), fetches_before + 1);
    assert_eq!(repo.cached_len(), 1);

    let second = repo.get_by_id(2).await.unwrap().unwrap();
    assert_eq!(driver.stats.fetches(), fetches_before + 1);
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(second.borrow().text, "Bazinga 2");
}

#[tokio::test]
async fn get_by_id_accepts_prepared_statement_dispatch() {
    let (_driver, repo) = bind_counting(BindOptions::default()).await;
    seed(&repo, 1).await;
    repo.release_all();

    let statement = repo.statements().select_by_id_statement().clone();
    let fetched = repo
        .get(Query::Prepared(statement), Params::named([("$id", 1_i64)]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(fetched.borrow().id, RowId::Persisted(1));
    assert!(repo.is_cached(1));
}

#[tokio::test]
async fn refetch_reloads_the_cached_instance_in_place() {
    let (driver, repo) = bind_counting(BindOptions::default()).await;
    seed(&repo, 1).await;
    let held = repo.get_by_id(1).await.unwrap().unwrap();

    rowbind_core::Driver::execute(
        &driver,
        Query::Sql("UPDATE dummy SET text = 'changed elsewhere' WHERE id = 1".to_string()),
        Params::None,
    )
    .await
    .unwrap();

    let refetched = repo
        .get("SELECT * FROM dummy WHERE id = 1", Params::None)
        .await
        .unwrap()
        .unwrap();

    assert!(Rc::ptr_eq(&held, &refetched));
    assert_eq!(held.borrow().text, "changed elsewhere");
}

#[tokio::test]
async fn missing_row_resolves_to_none_without_caching() {
    let (_driver, repo) = bind_counting(BindOptions::default()).await;

    assert!(repo.get_by_id(42).await.unwrap().is_none());
    assert_eq!(repo.cached_len(), 0);
}

#[tokio::test]
async fn failed_delete_keeps_cache_entry_by_default() {
    let (driver, repo) = bind_counting(BindOptions::default()).await;
    seed(&repo, 1).await;
    let dummy = repo.get_by_id(1).await.unwrap().unwrap();

    driver.stats.fail_statements_starting_with("DELETE FROM dummy WHERE");
    let err = repo.delete(&dummy).await.err().unwrap();
    driver.stats.stop_failing();

    assert!(matches!(err, OrmError::Db(_)));
    assert!(repo.is_cached(1));
    assert_eq!(dummy.borrow().id, RowId::Persisted(1));
    assert_eq!(row_count(&driver, "dummy").await, 1);
}

#[tokio::test]
async fn optimistic_eviction_drops_cache_entry_even_when_delete_fails() {
    let options = BindOptions {
        eviction: EvictionPolicy::BeforeDelete,
    };
    let (driver, repo) = bind_counting(options).await;
    seed(&repo, 1).await;
    let dummy = repo.get_by_id(1).await.unwrap().unwrap();

    driver.stats.fail_statements_starting_with("DELETE FROM dummy WHERE");
    assert!(repo.delete(&dummy).await.is_err());
    driver.stats.stop_failing();

    assert!(!repo.is_cached(1));
    assert_eq!(dummy.borrow().id, RowId::Persisted(1));
    assert_eq!(row_count(&driver, "dummy").await, 1);

    let refetched = repo.get_by_id(1).await.unwrap().unwrap();
    assert!(!Rc::ptr_eq(&refetched, &dummy));
}

#[tokio::test]
async fn failed_insert_leaves_instance_transient_and_uncached() {
    let (driver, repo) = bind_counting(BindOptions::default()).await;
    let dummy = shared(Dummy::new("rejected"));

    driver.stats.fail_statements_starting_with("INSERT INTO dummy");
    assert!(repo.save(&dummy).await.is_err());
    driver.stats.stop_failing();

    assert_eq!(dummy.borrow().id, RowId::Transient);
    assert_eq!(repo.cached_len(), 0);
}

#[tokio::test]
async fn rows_that_fail_to_load_are_never_cached() {
    let (driver, repo) = bind_counting(BindOptions::default()).await;
    rowbind_core::Driver::execute(
        &driver,
        Query::Sql("INSERT INTO dummy (id, text) VALUES (1, X'00')".to_string()),
        Params::None,
    )
    .await
    .unwrap();

    assert!(repo.get_by_id(1).await.is_err());
    assert_eq!(repo.cached_len(), 0);
    assert!(repo
        .get("SELECT * FROM dummy WHERE id = 1", Params::None)
        .await
        .is_err());
    assert!(repo.all("SELECT * FROM dummy", Params::None).await.is_err());
    let mut visited = 0;
    assert!(repo
        .each("SELECT * FROM dummy", Params::None, |_| visited += 1)
        .await
        .is_err());
    assert_eq!(visited, 0);
    assert_eq!(repo.cached_len(), 0);
    assert!(!repo.is_cached(1));

    let fetches_before = driver.stats.fetches();
    assert!(repo.get_by_id(1).await.is_err());
    assert_eq!(driver.stats.fetches(), fetches_before + 1);

    rowbind_core::Driver::execute(
        &driver,
        Query::Sql("UPDATE dummy SET text = 'repaired' WHERE id = 1".to_string()),
        Params::None,
    )
    .await
    .unwrap();
    let repaired = repo.get_by_id(1).await.unwrap().unwrap();
    assert_eq!(repaired.borrow().text, "repaired");
    assert!(repo.is_cached(1));
}
