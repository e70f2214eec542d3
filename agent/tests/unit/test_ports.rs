//! Port allocator tests

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use berth::detect::ProjectType;
use berth::errors::BerthError;
use berth::models::port::PortPair;
use berth::models::project::{NewProject, ProjectId};
use berth::ports::{PortAllocator, PortRange};
use berth::store::{SqliteStore, Store};

async fn setup(base: u16, max: u16) -> (Arc<dyn Store>, Arc<PortAllocator>) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let allocator = Arc::new(PortAllocator::new(
        store.clone(),
        PortRange::new(base, max).unwrap(),
    ));
    (store, allocator)
}

async fn add_project(store: &Arc<dyn Store>, name: &str) -> ProjectId {
    store
        .upsert_project(NewProject {
            name: name.to_string(),
            path: PathBuf::from("/srv").join(name),
            project_type: ProjectType::Static,
            description: None,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_preferred_port_then_next_free() {
    let (store, allocator) = setup(4000, 5000).await;
    let first = add_project(&store, "first").await;
    let second = add_project(&store, "second").await;

    let ports = allocator.reserve(first, Some(4000)).await.unwrap();
    assert_eq!(ports, PortPair { internal: 4000, external: 4000 });

    let ports = allocator.reserve(second, Some(4000)).await.unwrap();
    assert_eq!(ports, PortPair { internal: 4001, external: 4001 });

    let project = store.get_project(second).await.unwrap().unwrap();
    assert_eq!(project.internal_port, Some(4001));
    assert_eq!(project.external_port, Some(4001));
}

#[tokio::test]
async fn test_out_of_range_preference_scans_from_base() {
    let (store, allocator) = setup(4000, 5000).await;
    let project = add_project(&store, "app").await;

    let ports = allocator.reserve(project, Some(8080)).await.unwrap();
    assert_eq!(ports.internal, 4000);
}

#[tokio::test]
async fn test_reserve_is_idempotent_for_holder() {
    let (store, allocator) = setup(4000, 5000).await;
    let project = add_project(&store, "app").await;

    let first = allocator.reserve(project, Some(4500)).await.unwrap();
    let again = allocator.reserve(project, Some(4000)).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(allocator.stats().await.unwrap().used, 1);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let (store, allocator) = setup(4000, 5000).await;
    let project = add_project(&store, "app").await;

    allocator.reserve(project, None).await.unwrap();
    allocator.release(project).await.unwrap();
    allocator.release(project).await.unwrap();

    assert!(allocator.project_ports(project).await.unwrap().is_none());
    assert!(!allocator.is_in_use(4000).await.unwrap());
    let row = store.get_project(project).await.unwrap().unwrap();
    assert!(row.internal_port.is_none());
}

#[tokio::test]
async fn test_exhaustion() {
    let (store, allocator) = setup(4000, 4001).await;
    let a = add_project(&store, "a").await;
    let b = add_project(&store, "b").await;
    let c = add_project(&store, "c").await;

    allocator.reserve(a, None).await.unwrap();
    allocator.reserve(b, None).await.unwrap();
    let err = allocator.reserve(c, None).await.unwrap_err();
    assert!(matches!(err, BerthError::PortExhausted { base: 4000, max: 4001 }));

    // A freed port becomes available again
    allocator.release(a).await.unwrap();
    assert_eq!(allocator.reserve(c, None).await.unwrap().internal, 4000);
}

#[tokio::test]
async fn test_ports_stay_distinct_under_interleaving() {
    let (store, allocator) = setup(4000, 4063).await;
    let mut projects = Vec::new();
    for i in 0..32 {
        projects.push(add_project(&store, &format!("p{}", i)).await);
    }

    let mut handles = Vec::new();
    for (i, project) in projects.iter().copied().enumerate() {
        let allocator = allocator.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..3 {
                allocator.reserve(project, Some(4000)).await.unwrap();
                if (i + round) % 2 == 0 {
                    allocator.release(project).await.unwrap();
                }
            }
            allocator.reserve(project, Some(4000)).await.unwrap()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let ports = handle.await.unwrap();
        assert_eq!(ports.internal, ports.external);
        assert!(seen.insert(ports.internal), "port {} handed out twice", ports.internal);
    }

    let stats = allocator.stats().await.unwrap();
    assert_eq!(stats.used, 32);
    assert_eq!(stats.used_ports.len(), 32);
}

#[tokio::test]
async fn test_stats_and_free_search() {
    let (store, allocator) = setup(4000, 4009).await;
    let a = add_project(&store, "a").await;
    let b = add_project(&store, "b").await;
    allocator.reserve(a, Some(4003)).await.unwrap();
    allocator.reserve(b, Some(4001)).await.unwrap();

    let stats = allocator.stats().await.unwrap();
    assert_eq!(stats.total, 10);
    assert_eq!(stats.used, 2);
    assert_eq!(stats.available, 8);
    assert_eq!(stats.used_ports, vec![4001, 4003]);

    assert_eq!(allocator.find_free_in(4001, 4009).await.unwrap(), 4002);
    assert!(allocator.is_in_use(4003).await.unwrap());
}
