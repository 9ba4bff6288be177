//! Unbind teardown and racing operations

use std::sync::Arc;
use std::time::Duration;

use ldap_proxy::protocol::{BindRequest, ResultCode, Scope, SearchRequest};
use ldap_proxy::session::Identity;
use ldap_proxy::RecordingSink;

use test_helpers::*;

const JANE: &str = "uid=jane,ou=people,dc=example,dc=com";

async fn wait_for_unbinds(directory: &ldap_proxy::upstream::MockDirectory, expected: usize) {
    for _ in 0..100 {
        if directory.stats().unbinds >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} unbinds, saw {}",
        directory.stats().unbinds
    );
}

#[tokio::test]
async fn test_unbind_destroys_every_connection_of_identity() {
    let people = example_directory();
    let groups = example_directory();
    let proxy = proxy(
        config(vec![target("people", PEOPLE), target("groups", GROUPS)]),
        &[("people", &people), ("groups", &groups)],
    );
    let session = session();
    let sink = RecordingSink::new();

    proxy
        .bind(&session, BindRequest::simple(JANE, "secret"), &sink)
        .await
        .unwrap();
    proxy
        .search(&session, SearchRequest::new(ROOT, Scope::Subtree, "(objectClass=*)"), &sink)
        .await
        .unwrap();
    let identity = Identity::from_bind_name(JANE).unwrap();
    assert_eq!(proxy.pool().len(), 2);
    sink.clear();

    proxy.unbind(&session);

    for target in proxy.registry().iter() {
        assert!(proxy.pool().connection(&identity, target.id()).is_none());
    }
    assert!(proxy.pool().is_empty());
    assert!(sink.events().is_empty(), "unbind produces no response");
    assert!(session.identity().is_anonymous());
    wait_for_unbinds(&people, 1).await;
    wait_for_unbinds(&groups, 1).await;
}

#[tokio::test]
async fn test_unbind_leaves_other_identities_alone() {
    let directory = example_directory();
    let proxy = proxy(config(vec![target("example", ROOT)]), &[("example", &directory)]);
    let sink = RecordingSink::new();

    let anonymous = session();
    proxy
        .search(&anonymous, SearchRequest::new(ROOT, Scope::Base, "(objectClass=*)"), &sink)
        .await
        .unwrap();
    let jane = session();
    proxy
        .bind(&jane, BindRequest::simple(JANE, "secret"), &sink)
        .await
        .unwrap();
    assert_eq!(proxy.pool().len(), 2);

    proxy.unbind(&jane);

    assert_eq!(proxy.pool().len(), 1);
    assert!(proxy
        .pool()
        .connection(&Identity::Anonymous, proxy.registry().iter().next().unwrap().id())
        .is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_operation_racing_unbind_terminates() {
    let directory = example_directory();
    let proxy = proxy(config(vec![target("example", ROOT)]), &[("example", &directory)]);
    let session = Arc::new(session());
    let sink = Arc::new(RecordingSink::new());

    proxy
        .bind(&session, BindRequest::simple(JANE, "secret"), sink.as_ref())
        .await
        .unwrap();
    sink.clear();
    directory.set_latency(Duration::from_millis(200));

    let search = {
        let proxy = Arc::clone(&proxy);
        let session = Arc::clone(&session);
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            let request = SearchRequest::new(ROOT, Scope::Subtree, "(objectClass=*)");
            proxy.search(&session, request, sink.as_ref()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    proxy.unbind(&session);

    let outcome = tokio::time::timeout(Duration::from_secs(2), search)
        .await
        .expect("search must not hang after unbind")
        .unwrap();
    assert!(outcome.is_none(), "a cancelled client gets no result");
    assert!(sink.results().is_empty());
    assert!(proxy.pool().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_identity_sees_invalidation_or_completes() {
    let directory = example_directory();
    let proxy = proxy(config(vec![target("example", ROOT)]), &[("example", &directory)]);
    let first = Arc::new(session());
    let second = Arc::new(session());
    let sink = Arc::new(RecordingSink::new());

    for client in [&first, &second] {
        proxy
            .bind(client, BindRequest::simple(JANE, "secret"), sink.as_ref())
            .await
            .unwrap();
    }
    directory.set_latency(Duration::from_millis(100));

    let search = {
        let proxy = Arc::clone(&proxy);
        let second = Arc::clone(&second);
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            let request = SearchRequest::new(PEOPLE, Scope::OneLevel, "(uid=jane)");
            proxy.search(&second, request, sink.as_ref()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    proxy.unbind(&first);

    let result = search.await.unwrap().unwrap();
    assert!(
        matches!(result.code, ResultCode::Success | ResultCode::Unavailable),
        "unexpected {}",
        result.code
    );
}

#[tokio::test]
async fn test_operations_after_shutdown_refused() {
    let directory = example_directory();
    let proxy = proxy(config(vec![target("example", ROOT)]), &[("example", &directory)]);
    let sink = RecordingSink::new();
    let session = session();

    proxy
        .search(&session, SearchRequest::new(ROOT, Scope::Base, "(objectClass=*)"), &sink)
        .await
        .unwrap();
    proxy.shutdown();
    sink.clear();

    let result = proxy
        .search(&session, SearchRequest::new(ROOT, Scope::Base, "(objectClass=*)"), &sink)
        .await
        .unwrap();
    assert_eq!(result.code, ResultCode::UnwillingToPerform);
    wait_for_unbinds(&directory, 1).await;
}
