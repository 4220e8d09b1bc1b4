use std::sync::Arc;

use cuizly_sync::http::{self, RestApi};
use cuizly_sync::{InMemoryAuth, InMemoryBackend};

pub struct Server {
    pub base: String,
    pub api: Arc<RestApi>,
}

/// Bind to port 0 and return the actual address.
pub async fn start_server() -> Server {
    let backend = InMemoryBackend::new()
        .restrict_to_owner("favorites", "user_id")
        .with_unique("favorites", &["user_id", "restaurant_id"]);
    let api = RestApi::new(backend, InMemoryAuth::new());
    let app = http::router(api.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Server {
        base: format!("http://{addr}"),
        api,
    }
}
