//! Connection pool behavior under concurrency
//!
//! However many operations race for one (identity, target), the pool dials
//! it once and every operation ends up on the same connection.

use std::sync::Arc;
use std::time::Duration;

use ldap_proxy::protocol::{BindRequest, ResultCode, Scope, SearchRequest};
use ldap_proxy::session::{Credentials, Identity};
use ldap_proxy::RecordingSink;

use test_helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_dials_once() {
    let directory = example_directory();
    directory.set_latency(Duration::from_millis(20));
    let proxy = proxy(config(vec![target("example", ROOT)]), &[("example", &directory)]);
    let target = Arc::clone(proxy.registry().iter().next().unwrap());
    let credentials = Credentials::anonymous();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let proxy = Arc::clone(&proxy);
            let target = Arc::clone(&target);
            let credentials = credentials.clone();
            tokio::spawn(async move {
                let conn = proxy.pool().acquire(&target, &credentials).await.unwrap();
                conn.id()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all acquirers must share one connection");
    assert_eq!(directory.stats().dials, 1);
    assert_eq!(proxy.pool().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_searches_share_bound_connection() {
    let directory = example_directory();
    let proxy = proxy(config(vec![target("example", ROOT)]), &[("example", &directory)]);
    let session = Arc::new(session());
    let sink = Arc::new(RecordingSink::new());

    proxy
        .bind(
            &session,
            BindRequest::simple("uid=jane,ou=people,dc=example,dc=com", "secret"),
            sink.as_ref(),
        )
        .await
        .unwrap();
    directory.set_latency(Duration::from_millis(5));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let proxy = Arc::clone(&proxy);
            let session = Arc::clone(&session);
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let request = SearchRequest::new(PEOPLE, Scope::Subtree, "(uid=jane)");
                proxy.search(&session, request, sink.as_ref()).await
            })
        })
        .collect();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.code, ResultCode::Success);
    }

    let stats = directory.stats();
    assert_eq!(stats.dials, 1);
    assert_eq!(stats.binds, 1);
    assert_eq!(stats.exchanges, 8);
    assert_eq!(proxy.pool().len(), 1);
}

#[tokio::test]
async fn test_identities_get_separate_connections() {
    let directory = example_directory();
    let proxy = proxy(config(vec![target("example", ROOT)]), &[("example", &directory)]);
    let target = Arc::clone(proxy.registry().iter().next().unwrap());

    let jane = Credentials::new(
        Identity::from_bind_name("uid=jane,ou=people,dc=example,dc=com").unwrap(),
        "secret",
    );
    let anonymous = proxy.pool().acquire(&target, &Credentials::anonymous()).await.unwrap();
    let bound = proxy.pool().acquire(&target, &jane).await.unwrap();

    assert_ne!(anonymous.id(), bound.id());
    assert_eq!(bound.identity(), jane.identity());
    assert_eq!(directory.stats().dials, 2);
    assert_eq!(proxy.pool().len(), 2);
}

#[tokio::test]
async fn test_exhausted_pool_answers_busy() {
    let directory = example_directory();
    let proxy = proxy(
        config_with_pool_size(vec![target("example", ROOT)], 1),
        &[("example", &directory)],
    );
    let sink = RecordingSink::new();

    let anonymous = session();
    proxy
        .search(&anonymous, SearchRequest::new(ROOT, Scope::Base, "(objectClass=*)"), &sink)
        .await
        .unwrap();
    sink.clear();

    let jane = session();
    let result = proxy
        .bind(
            &jane,
            BindRequest::simple("uid=jane,ou=people,dc=example,dc=com", "secret"),
            &sink,
        )
        .await
        .unwrap();
    assert_eq!(result.code, ResultCode::Busy);
    assert!(jane.identity().is_anonymous());
    assert_eq!(proxy.pool().len(), 1);
}
