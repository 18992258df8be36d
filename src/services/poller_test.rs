use super::*;
use crate::model::{AssociationRecord, EventKind, PresenceEvent};
use crate::services::directory::DeviceDirectory;
use crate::services::leases::LeaseCache;
use crate::services::snapshot::SnapshotPublisher;
use crate::source::FetchError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Default)]
struct Script {
    connects: VecDeque<Result<(), FetchError>>,
    fetches: VecDeque<Result<Vec<AssociationRecord>, FetchError>>,
    connect_calls: usize,
    close_calls: usize,
}

/// Association source replaying a script. Once the script runs out,
/// connects succeed and fetches return an empty table.
#[derive(Clone, Default)]
struct ScriptedSource(Arc<Mutex<Script>>);

impl ScriptedSource {
    fn with(connects: Vec<Result<(), FetchError>>, fetches: Vec<Result<Vec<AssociationRecord>, FetchError>>) -> Self {
        Self(Arc::new(Mutex::new(Script {
            connects: connects.into(),
            fetches: fetches.into(),
            ..Script::default()
        })))
    }

    fn counts(&self) -> (usize, usize) {
        let script = self.0.lock().expect("script mutex should lock");
        (script.connect_calls, script.close_calls)
    }
}

#[async_trait::async_trait]
impl AssociationSource for ScriptedSource {
    async fn connect(&mut self) -> Result<(), FetchError> {
        let mut script = self.0.lock().expect("script mutex should lock");
        script.connect_calls += 1;
        script.connects.pop_front().unwrap_or(Ok(()))
    }

    async fn fetch(&mut self) -> Result<Vec<AssociationRecord>, FetchError> {
        let mut script = self.0.lock().expect("script mutex should lock");
        script.fetches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn close(&mut self) {
        self.0.lock().expect("script mutex should lock").close_calls += 1;
    }
}

fn row(mac: &str, interface: &str) -> AssociationRecord {
    AssociationRecord { interface: interface.into(), mac: mac.into(), signal: "-50".into(), ..AssociationRecord::default() }
}

struct Harness {
    publisher: Arc<SnapshotPublisher>,
    rx: mpsc::Receiver<PresenceEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

fn start(source: ScriptedSource) -> Harness {
    let publisher = Arc::new(SnapshotPublisher::new());
    let (tx, rx) = mpsc::channel(64);
    let reconciler = Reconciler::new(
        Arc::new(LeaseCache::new()),
        Arc::new(DeviceDirectory::default()),
        publisher.clone(),
        tx,
    );
    let poller = AssociationPoller::new(source, reconciler, Duration::from_millis(10))
        .with_backoff(Duration::from_millis(10));
    let cancel = CancellationToken::new();
    let handle = spawn_poller_task(poller, cancel.clone());
    Harness { publisher, rx, cancel, handle }
}

async fn next_event(rx: &mut mpsc::Receiver<PresenceEvent>) -> PresenceEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event receive timed out")
        .expect("event channel closed unexpectedly")
}

async fn stop(h: Harness) {
    h.cancel.cancel();
    timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn polls_and_publishes() {
    let source = ScriptedSource::with(vec![], vec![Ok(vec![row("AA:BB", "cap1")])]);
    let mut h = start(source);

    let event = next_event(&mut h.rx).await;
    assert_eq!(event.kind(), EventKind::Connect);
    assert_eq!(event.mac(), "AA:BB");
    assert!(h.publisher.current().is_published());
    stop(h).await;
}

#[tokio::test]
async fn unreachable_controller_at_startup_is_retried() {
    let source = ScriptedSource::with(
        vec![Err(FetchError::NotConnected), Err(FetchError::Timeout(Duration::from_secs(1))), Ok(())],
        vec![Ok(vec![row("AA:BB", "cap1")])],
    );
    let mut h = start(source.clone());

    assert_eq!(next_event(&mut h.rx).await.kind(), EventKind::Connect);
    assert_eq!(source.counts().0, 3);
    stop(h).await;
}

#[tokio::test]
async fn fetch_failure_closes_reconnects_and_resumes() {
    let source = ScriptedSource::with(
        vec![Ok(()), Err(FetchError::NotConnected), Ok(())],
        vec![
            Ok(vec![row("AA:BB", "cap1")]),
            Err(FetchError::Fatal("session closed".into())),
            Ok(vec![row("AA:BB", "cap2")]),
        ],
    );
    let mut h = start(source.clone());

    assert_eq!(next_event(&mut h.rx).await.kind(), EventKind::Connect);
    let PresenceEvent::Roam { old, new } = next_event(&mut h.rx).await else {
        panic!("expected roam after reconnect");
    };
    assert_eq!((old.interface.as_str(), new.interface.as_str()), ("cap1", "cap2"));

    let (connects, closes) = source.counts();
    assert_eq!(connects, 3);
    assert!(closes >= 1);
    stop(h).await;
}

#[tokio::test]
async fn outage_keeps_last_snapshot() {
    let source = ScriptedSource::with(
        vec![Ok(())],
        vec![Ok(vec![row("AA:BB", "cap1")]), Err(FetchError::NotConnected)],
    );
    // Every reconnect after the script runs out would succeed, so keep the
    // connect side failing to hold the outage open.
    {
        let mut script = source.0.lock().unwrap();
        script.connects.extend((0..1000).map(|_| Err(FetchError::NotConnected)));
    }
    let mut h = start(source.clone());

    assert_eq!(next_event(&mut h.rx).await.kind(), EventKind::Connect);
    let published = h.publisher.current();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let during = h.publisher.current();
    assert_eq!(during.last_update, published.last_update);
    assert_eq!(during.count, 1);
    assert!(source.counts().0 > 2);
    stop(h).await;
}

#[tokio::test]
async fn cancel_stops_during_backoff() {
    let source = ScriptedSource::with((0..1000).map(|_| Err(FetchError::NotConnected)).collect(), vec![]);
    let h = start(source.clone());
    tokio::time::sleep(Duration::from_millis(30)).await;

    stop(h).await;
    // The final close always runs.
    assert!(source.counts().1 >= 1);
}
