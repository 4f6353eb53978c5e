//! Client components against a real server bound on a loopback port.

use std::{sync::Arc, time::Duration};

use tokio::net::TcpListener;
use trivia_champ::{
    dao::{
        board_file::{BoardStore, JsonBoardFile},
        kv_store::{KeyValueStore, MemoryStore},
        local_board::LocalLeaderboard,
        presence_client::PresenceClient,
        remote_board::{ClearScope, HttpLeaderboard, RemoteLeaderboard},
    },
    routes,
    services::reconciler::{BoardSource, ScoreReconciler},
    state::{AppState, quiz::Category},
};

struct Server {
    base_url: String,
    _dir: tempfile::TempDir,
}

async fn spawn_server() -> Server {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn BoardStore> =
        Arc::new(JsonBoardFile::new(dir.path().join("leaderboard.json")));
    let state = AppState::new(store, Default::default(), Duration::from_secs(45));
    let app = routes::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    Server {
        base_url: format!("http://{addr}"),
        _dir: dir,
    }
}

fn reconciler(remote: HttpLeaderboard) -> (ScoreReconciler, Arc<dyn KeyValueStore>) {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let local = LocalLeaderboard::new(store.clone());
    (ScoreReconciler::new(Arc::new(remote), local), store)
}

#[tokio::test]
async fn recorded_score_is_read_back_from_the_server() {
    let server = spawn_server().await;
    let (reconciler, _) = reconciler(HttpLeaderboard::new(&server.base_url).unwrap());
    let history = Category::new("23");

    reconciler.record_score("Bob", 2, &history).await.unwrap();
    let outcome = reconciler.record_score("Bob", 3, &history).await.unwrap();
    assert_eq!(outcome.stored_in, BoardSource::Remote);

    let resolved = reconciler.get_board(&history).await;
    assert_eq!(resolved.source, BoardSource::Remote);
    assert_eq!(resolved.board.get("Bob"), Some(&5));
    assert!(reconciler.local().board(&history).unwrap().is_empty());
}

#[tokio::test]
async fn offline_history_is_synced_once_when_the_server_appears() {
    let server = spawn_server().await;
    let math = Category::new("19");

    // Played while the server was down: the write lands locally.
    let unreachable = HttpLeaderboard::new("http://127.0.0.1:9").unwrap();
    let (offline, store) = reconciler(unreachable);
    let outcome = offline.record_score("Alice", 7, &math).await.unwrap();
    assert_eq!(outcome.stored_in, BoardSource::Local);
    assert_eq!(offline.get_board(&math).await.source, BoardSource::Local);

    let remote = HttpLeaderboard::new(&server.base_url).unwrap();
    let online = ScoreReconciler::new(Arc::new(remote), LocalLeaderboard::new(store));

    let resolved = online.get_board(&math).await;
    assert_eq!(resolved.source, BoardSource::Remote);
    assert_eq!(resolved.board.get("Alice"), Some(&7));

    // A second read must not credit the local history again.
    let again = online.get_board(&math).await;
    assert_eq!(again.board.get("Alice"), Some(&7));
}

#[tokio::test]
async fn clear_reaches_the_server() {
    let server = spawn_server().await;
    let remote = HttpLeaderboard::new(&server.base_url).unwrap();
    let math = Category::new("19");
    remote.increment("Ann", 4, &math).await.unwrap();
    let (reconciler, _) = reconciler(HttpLeaderboard::new(&server.base_url).unwrap());

    let report = reconciler.clear(&ClearScope::Category(math.clone())).await;

    assert!(report.local_cleared);
    assert!(report.remote_cleared);
    assert!(remote.fetch(&math).await.unwrap().is_empty());
}

#[tokio::test]
async fn presence_client_reports_online_players() {
    let server = spawn_server().await;
    let http = reqwest::Client::new();
    let first = PresenceClient::new(http.clone(), &server.base_url, "device-1");
    let second = PresenceClient::new(http, &server.base_url, "device-2");

    assert_eq!(first.ping("Ann").await, Some(1));
    assert_eq!(second.ping("Ben").await, Some(2));
    assert_eq!(first.online_count().await, Some(2));

    let nowhere = PresenceClient::new(reqwest::Client::new(), "http://127.0.0.1:9", "x");
    assert_eq!(nowhere.ping("Ann").await, None);
}
