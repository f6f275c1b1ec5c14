//! # Aplicación de ejemplo: banners
//! src/app.rs
//!
//! Colaborador externo del núcleo: registra rutas en el [`Registry`] y
//! responde usando solo el `Request` parseado y el `ResponseWriter`.
//! Guarda los banners en memoria.
//!
//! | Ruta                              | Métodos        |
//! |-----------------------------------|----------------|
//! | `/health`                         | GET            |
//! | `/banners`                        | GET, POST      |
//! | `/banners/{id}`                   | GET, DELETE    |
//! | `/banners/{id}/image/img{name}`   | GET            |

use crate::error::PatternError;
use crate::http::{Method, Request, Response, ResponseWriter, StatusCode};
use crate::router::Registry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

/// Un banner publicitario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    /// 0 al crear: el store asigna uno nuevo
    #[serde(default)]
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub button: String,
    #[serde(default)]
    pub link: String,
}

struct StoreData {
    next_id: u64,
    banners: BTreeMap<u64, Banner>,
}

/// Store en memoria, thread-safe
pub struct BannerStore {
    inner: Mutex<StoreData>,
}

impl BannerStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreData {
                next_id: 1,
                banners: BTreeMap::new(),
            }),
        }
    }

    /// Todos los banners, ordenados por id
    pub fn all(&self) -> Vec<Banner> {
        self.inner.lock().banners.values().cloned().collect()
    }

    pub fn by_id(&self, id: u64) -> Option<Banner> {
        self.inner.lock().banners.get(&id).cloned()
    }

    /// Crea (id 0) o reemplaza un banner. Retorna el banner guardado y si
    /// fue creado.
    ///
    /// `None` si el id es `u64::MAX` (o si los ids asignables se agotaron):
    /// no quedaría un id libre para el siguiente banner.
    pub fn save(&self, mut banner: Banner) -> Option<(Banner, bool)> {
        let mut data = self.inner.lock();

        let created = banner.id == 0 || !data.banners.contains_key(&banner.id);
        if banner.id == 0 {
            banner.id = data.next_id;
        }
        let following = banner.id.checked_add(1)?;
        data.next_id = data.next_id.max(following);
        data.banners.insert(banner.id, banner.clone());

        Some((banner, created))
    }

    pub fn remove_by_id(&self, id: u64) -> Option<Banner> {
        self.inner.lock().banners.remove(&id)
    }
}

impl Default for BannerStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Registra todas las rutas de la aplicación
pub fn register(registry: &Registry, store: Arc<BannerStore>) -> Result<(), PatternError> {
    registry.register("/health", health_handler)?;

    let banners = Arc::clone(&store);
    registry.register("/banners", move |req, w| collection_handler(&banners, req, w))?;

    let banners = Arc::clone(&store);
    registry.register("/banners/{id}", move |req, w| item_handler(&banners, req, w))?;

    registry.register("/banners/{id}/image/img{name}", image_handler)?;

    Ok(())
}

fn health_handler(req: &Request, w: &mut ResponseWriter<'_>) -> io::Result<()> {
    match req.method() {
        Method::GET => w.send(&Response::json(StatusCode::Ok, &json!({ "status": "ok" }))),
        _ => w.send(&method_not_allowed(req)),
    }
}

fn collection_handler(
    store: &BannerStore,
    req: &Request,
    w: &mut ResponseWriter<'_>,
) -> io::Result<()> {
    let response = match req.method() {
        Method::GET => Response::json(StatusCode::Ok, &store.all()),
        Method::POST => match serde_json::from_slice::<Banner>(req.body()) {
            Ok(banner) => match store.save(banner) {
                Some((saved, true)) => Response::json(StatusCode::Created, &saved),
                Some((saved, false)) => Response::json(StatusCode::Ok, &saved),
                None => Response::error(StatusCode::BadRequest, "banner id out of range"),
            },
            Err(e) => Response::error(StatusCode::BadRequest, &format!("invalid banner: {}", e)),
        },
        _ => method_not_allowed(req),
    };

    w.send(&response)
}

fn item_handler(store: &BannerStore, req: &Request, w: &mut ResponseWriter<'_>) -> io::Result<()> {
    let Some(id) = parse_id(req) else {
        return w.send(&Response::error(StatusCode::BadRequest, "invalid id"));
    };

    let response = match req.method() {
        Method::GET => match store.by_id(id) {
            Some(banner) => Response::json(StatusCode::Ok, &banner),
            None => banner_not_found(id),
        },
        Method::DELETE => match store.remove_by_id(id) {
            Some(banner) => Response::json(StatusCode::Ok, &banner),
            None => banner_not_found(id),
        },
        _ => method_not_allowed(req),
    };

    w.send(&response)
}

fn image_handler(req: &Request, w: &mut ResponseWriter<'_>) -> io::Result<()> {
    if req.method() != &Method::GET {
        return w.send(&method_not_allowed(req));
    }

    let Some(id) = parse_id(req) else {
        return w.send(&Response::error(StatusCode::BadRequest, "invalid id"));
    };
    let name = req.path_param("name").unwrap_or_default();

    w.send(&Response::json(
        StatusCode::Ok,
        &json!({ "id": id, "image": name }),
    ))
}

fn parse_id(req: &Request) -> Option<u64> {
    req.path_param("id")?.parse().ok()
}

fn banner_not_found(id: u64) -> Response {
    Response::error(StatusCode::NotFound, &format!("banner {} not found", id))
}

fn method_not_allowed(req: &Request) -> Response {
    Response::error(
        StatusCode::MethodNotAllowed,
        &format!("method {} not allowed on {}", req.method(), req.path()),
    )
}
