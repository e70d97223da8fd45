use std::path::PathBuf;
use std::sync::Arc;

use actix_files::{Files, NamedFile};
use actix_web::{get, web, App, HttpServer, Responder};

use crate::state::PublishedState;

/// Directory holding the landing page and its assets.
#[derive(Clone)]
pub struct PublicDir(pub PathBuf);

/// Serve the landing page
#[get("/")]
pub async fn index(public: web::Data<PublicDir>) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open_async(public.0.join("index.html")).await?)
}

/// Current leader, the stream with the fewest players alive
///
/// # Example
/// ```shell
/// curl http://localhost:3000/current
/// ```
///
/// # Returns
/// ```json
/// {
///     "stream_name": "alice",
///     "alive": 7,
///     "stream_url": "https://player.twitch.tv/?channel=alice",
///     "updated": "2024-05-01T12:00:00Z"
/// }
/// ```
#[get("/current")]
pub async fn current(state: web::Data<PublishedState>) -> impl Responder {
    web::Json(state.leader())
}

/// Every stream ranked in the last published cycle, fewest alive first
///
/// # Example
/// ```shell
/// curl http://localhost:3000/all
/// ```
#[get("/all")]
pub async fn all(state: web::Data<PublishedState>) -> impl Responder {
    web::Json(state.all())
}

/// Run the API server
pub async fn run_api_server(
    state: Arc<PublishedState>,
    public_dir: PathBuf,
    port: u16,
) -> std::io::Result<()> {
    let state = web::Data::from(state);
    let public = web::Data::new(PublicDir(public_dir));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(public.clone())
            .service(index)
            .service(current)
            .service(all)
            .service(Files::new("/", public.0.clone()))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
