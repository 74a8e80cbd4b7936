use super::*;
use crate::source::StoreError;
use crate::source::test_helpers::MockProfileStore;
use crate::state::Role;
use crate::state::test_helpers::*;

type Deliveries = Arc<Mutex<Vec<(u64, Option<ProfileRecord>)>>>;

fn recording_sink() -> (ProfileSink, Deliveries) {
    let deliveries: Deliveries = Arc::new(Mutex::new(Vec::new()));
    let tap = Arc::clone(&deliveries);
    let sink: ProfileSink = Arc::new(move |epoch, outcome| {
        tap.lock().unwrap().push((epoch, outcome));
    });
    (sink, deliveries)
}

fn coordinator(store: &Arc<MockProfileStore>) -> (ProfileFetchCoordinator, Deliveries) {
    let (sink, deliveries) = recording_sink();
    let coordinator =
        ProfileFetchCoordinator::new(
            Arc::clone(store) as Arc<dyn ProfileStore>,
            Duration::from_secs(10),
            sink,
        );
    (coordinator, deliveries)
}

// =============================================================================
// settlement
// =============================================================================

#[tokio::test(start_paused = true)]
async fn delivers_profile_tagged_with_epoch() {
    let user = test_user("u@example.com");
    let profile = test_profile(&user, Role::Student);
    let store = Arc::new(MockProfileStore::new());
    store.put(profile.clone());
    let (coordinator, deliveries) = coordinator(&store);

    coordinator.request(user.id, 3);
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(*deliveries.lock().unwrap(), vec![(3, Some(profile))]);
}

#[tokio::test(start_paused = true)]
async fn missing_row_settles_to_none() {
    let user = test_user("new@example.com");
    let store = Arc::new(MockProfileStore::new());
    let (coordinator, deliveries) = coordinator(&store);

    coordinator.request(user.id, 1);
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(*deliveries.lock().unwrap(), vec![(1, None)]);
}

#[tokio::test(start_paused = true)]
async fn store_error_settles_to_none() {
    let user = test_user("u@example.com");
    let store = Arc::new(MockProfileStore::new());
    store.script_fetch_error(StoreError::Transport("down".into()));
    let (coordinator, deliveries) = coordinator(&store);

    coordinator.request(user.id, 1);
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(*deliveries.lock().unwrap(), vec![(1, None)]);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_to_none() {
    let user = test_user("slow@example.com");
    let store = Arc::new(MockProfileStore::new());
    store.put(test_profile(&user, Role::Student));
    store.set_delay(user.id, Duration::from_secs(30));
    let (coordinator, deliveries) = coordinator(&store);

    coordinator.request(user.id, 1);
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(*deliveries.lock().unwrap(), vec![(1, None)]);
}

// =============================================================================
// supersession
// =============================================================================

#[tokio::test(start_paused = true)]
async fn new_request_aborts_outstanding_one() {
    let u1 = test_user("u1@example.com");
    let u2 = test_user("u2@example.com");
    let store = Arc::new(MockProfileStore::new());
    store.put(test_profile(&u1, Role::Student));
    store.put(test_profile(&u2, Role::Admin));
    store.set_delay(u1.id, Duration::from_millis(500));
    let (coordinator, deliveries) = coordinator(&store);

    coordinator.request(u1.id, 1);
    coordinator.request(u2.id, 2);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let delivered = deliveries.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, 2);
    assert_eq!(delivered[0].1.as_ref().unwrap().id, u2.id);
}

#[tokio::test(start_paused = true)]
async fn cancel_suppresses_delivery() {
    let user = test_user("u@example.com");
    let store = Arc::new(MockProfileStore::new());
    store.put(test_profile(&user, Role::Student));
    store.set_delay(user.id, Duration::from_millis(100));
    let (coordinator, deliveries) = coordinator(&store);

    coordinator.request(user.id, 1);
    coordinator.cancel();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(deliveries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn usable_again_after_cancel() {
    let user = test_user("u@example.com");
    let profile = test_profile(&user, Role::Admin);
    let store = Arc::new(MockProfileStore::new());
    store.put(profile.clone());
    let (coordinator, deliveries) = coordinator(&store);

    coordinator.request(user.id, 1);
    coordinator.cancel();
    coordinator.request(user.id, 2);
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(*deliveries.lock().unwrap(), vec![(2, Some(profile))]);
}
