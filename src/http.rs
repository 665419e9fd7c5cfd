//! HTTP API for the feed engine
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness plus row counts
//! - `GET /feed?page&limit&tags&session_id` - Recommended page
//! - `POST /items` - Create an item
//! - `GET /items/search?q&limit&offset` - Keyword search
//! - `GET|PATCH|DELETE /items/{id}` - Read, update, delete
//! - `POST|GET /items/{id}/interactions` - Record a swipe / counts by type
//! - `GET /items/{id}/interactions/history?limit&offset` - Swipes on the item
//! - `GET /items/{id}/stats` - Derived engagement stats
//! - `POST /items/{id}/views` - Count a view
//! - `POST|GET /items/{id}/comments` - Add / list comment threads
//! - `POST /users` - Register a username
//! - `GET /users/{id}` - Profile with follow counters
//! - `GET /users/{id}/items?limit&offset` - Items owned by the user
//! - `GET|POST|DELETE /users/{id}/follow` - Check / follow / unfollow
//! - `GET /users/{id}/followers`, `GET /users/{id}/following`
//! - `GET /users/{id}/interactions?type&limit&offset` - Swipe history
//!
//! The caller's identity comes from the `X-User-Id` header, set by the
//! gateway in front of this service. Every handler runs its database work on
//! the blocking pool under the configured request deadline; a request that
//! overruns it is answered with 504.
//!
//! A 504 on a write does not mean the write was dropped. Reads stop at their
//! next cancellation check, but a write that already started still commits,
//! so a retried swipe or follow may come back as 409.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::db::{CreateCommentInput, CreateItemInput, InteractionType, ItemPatch, ItemWithTags, RecordInteractionInput};
use crate::error::FeedError;
use crate::services::response::{self, error_response, from_create_result, from_delete_result, from_option, from_result};
use crate::services::{FeedRequest, Services};

/// Identity header set by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

type HttpResponse = Response<Full<Bytes>>;

/// Feed page as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "feed/")]
pub struct FeedResponse {
    pub item_ids: Vec<i64>,
    pub items: Vec<ItemWithTags>,
    pub has_more: bool,
    pub session_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    page: Option<i64>,
    limit: Option<i64>,
    /// Comma-separated
    tags: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CreateUserBody {
    username: String,
}

#[derive(Debug, Serialize)]
struct FollowStatus {
    following: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    #[serde(rename = "type")]
    interaction_type: Option<InteractionType>,
}

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

fn list_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = match limit {
        Some(n) if n > 0 => n.min(MAX_LIST_LIMIT),
        _ => DEFAULT_LIST_LIMIT,
    };
    (limit, offset.unwrap_or(0).max(0))
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
    request_timeout: Duration,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr, request_timeout: Duration) -> Self {
        Self {
            services,
            bind_addr,
            request_timeout,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), FeedError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    pub async fn handle_request(&self, req: Request<Incoming>) -> Result<HttpResponse, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let query = query.as_deref();
        debug!(method = %method, path = %path, "Incoming request");

        let user_id = match caller_id(&req) {
            Ok(id) => id,
            Err(e) => return Ok(error_response(e)),
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let response = match (&method, segments.as_slice()) {
            (&Method::GET, ["health"]) => self.handle_health().await,

            (&Method::GET, ["feed"]) => self.handle_feed(query, user_id).await,

            (&Method::POST, ["items"]) => self.handle_create_item(req, user_id).await,
            (&Method::POST, ["users"]) => self.handle_create_user(req).await,
            (&Method::GET, ["items", "search"]) => self.handle_search(query).await,

            (_, ["items", id, rest @ ..]) => match parse_id(id) {
                Ok(item_id) => self.route_item(method.clone(), rest, req, query, item_id, user_id).await,
                Err(e) => error_response(e),
            },

            (_, ["users", id, rest @ ..]) => match parse_id(id) {
                Ok(target) => self.route_user(method.clone(), rest, query, target, user_id).await,
                Err(e) => error_response(e),
            },

            _ => response::not_found("Not found"),
        };

        Ok(response)
    }

    async fn route_item(
        &self,
        method: Method,
        rest: &[&str],
        req: Request<Incoming>,
        query: Option<&str>,
        item_id: i64,
        user_id: Option<i64>,
    ) -> HttpResponse {
        match (method, rest) {
            (Method::GET, []) => {
                let items = self.services.items.clone();
                from_option(self.blocking(move |_| items.get(item_id)).await, "Item not found")
            }
            (Method::PATCH, []) => self.handle_update_item(req, item_id, user_id).await,
            (Method::DELETE, []) => {
                let actor = match authenticated(user_id) {
                    Ok(id) => id,
                    Err(e) => return error_response(e),
                };
                let items = self.services.items.clone();
                from_delete_result(self.blocking(move |_| items.delete(actor, item_id)).await)
            }

            (Method::POST, ["interactions"]) => self.handle_record_interaction(req, item_id, user_id).await,
            (Method::GET, ["interactions"]) => {
                let interactions = self.services.interactions.clone();
                from_result(self.blocking(move |_| interactions.stats(item_id)).await)
            }
            (Method::GET, ["interactions", "history"]) => {
                let query: PageQuery = match parse_query(query) {
                    Ok(q) => q,
                    Err(e) => return error_response(e),
                };
                let (limit, offset) = list_bounds(query.limit, query.offset);
                let interactions = self.services.interactions.clone();
                from_result(
                    self.blocking(move |_| interactions.list_by_item(item_id, limit, offset))
                        .await,
                )
            }

            (Method::GET, ["stats"]) => {
                let items = self.services.items.clone();
                from_result(self.blocking(move |_| items.stats(item_id)).await)
            }

            (Method::POST, ["views"]) => {
                let items = self.services.items.clone();
                from_delete_result(self.blocking(move |_| items.increment_views(item_id)).await)
            }

            (Method::POST, ["comments"]) => self.handle_add_comment(req, item_id, user_id).await,
            (Method::GET, ["comments"]) => {
                let query: PageQuery = match parse_query(query) {
                    Ok(q) => q,
                    Err(e) => return error_response(e),
                };
                let (limit, offset) = list_bounds(query.limit, query.offset);
                let items = self.services.items.clone();
                from_result(
                    self.blocking(move |_| items.list_comments(item_id, limit, offset))
                        .await,
                )
            }

            (_, [] | ["interactions"] | ["interactions", "history"] | ["stats"] | ["views"] | ["comments"]) => {
                response::method_not_allowed()
            }
            _ => response::not_found("Not found"),
        }
    }

    async fn route_user(
        &self,
        method: Method,
        rest: &[&str],
        query: Option<&str>,
        target: i64,
        user_id: Option<i64>,
    ) -> HttpResponse {
        match (method, rest) {
            (Method::GET, []) => {
                let follows = self.services.follows.clone();
                from_option(self.blocking(move |_| follows.get_user(target)).await, "User not found")
            }
            (Method::GET, ["items"]) => {
                let query: PageQuery = match parse_query(query) {
                    Ok(q) => q,
                    Err(e) => return error_response(e),
                };
                let (limit, offset) = list_bounds(query.limit, query.offset);
                let items = self.services.items.clone();
                from_result(
                    self.blocking(move |_| items.list_by_owner(target, limit, offset))
                        .await,
                )
            }
            (Method::GET, ["follow"]) => {
                let follower = match authenticated(user_id) {
                    Ok(id) => id,
                    Err(e) => return error_response(e),
                };
                let follows = self.services.follows.clone();
                let result = self
                    .blocking(move |_| follows.is_following(follower, target))
                    .await
                    .map(|following| FollowStatus { following });
                from_result(result)
            }
            (Method::POST, ["follow"]) => {
                let follower = match authenticated(user_id) {
                    Ok(id) => id,
                    Err(e) => return error_response(e),
                };
                let follows = self.services.follows.clone();
                from_create_result(self.blocking(move |_| follows.follow(follower, target)).await)
            }
            (Method::DELETE, ["follow"]) => {
                let follower = match authenticated(user_id) {
                    Ok(id) => id,
                    Err(e) => return error_response(e),
                };
                let follows = self.services.follows.clone();
                from_delete_result(self.blocking(move |_| follows.unfollow(follower, target)).await)
            }
            (Method::GET, ["followers"]) => {
                let follows = self.services.follows.clone();
                from_result(self.blocking(move |_| follows.followers(target)).await)
            }
            (Method::GET, ["following"]) => {
                let follows = self.services.follows.clone();
                from_result(self.blocking(move |_| follows.following(target)).await)
            }
            (Method::GET, ["interactions"]) => self.handle_user_interactions(query, target).await,
            (_, [] | ["items"] | ["follow"] | ["followers"] | ["following"]) => response::method_not_allowed(),
            _ => response::not_found("Not found"),
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    async fn handle_health(&self) -> HttpResponse {
        let db = self.services.db.clone();
        match self.blocking(move |_| db.stats()).await {
            Ok(stats) => response::ok(&serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "items": stats.item_count,
                "users": stats.user_count,
                "interactions": stats.interaction_count,
                "follows": stats.follow_count,
            })),
            Err(e) => error_response(e),
        }
    }

    /// GET /feed
    async fn handle_feed(&self, query: Option<&str>, user_id: Option<i64>) -> HttpResponse {
        let query: FeedQuery = match parse_query(query) {
            Ok(q) => q,
            Err(e) => return error_response(e),
        };

        let session_id = query
            .session_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let request = FeedRequest {
            user_id,
            page: query.page.unwrap_or(1),
            limit: query.limit,
            tags: query
                .tags
                .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
        };

        let feed = self.services.feed.clone();
        let items = self.services.items.clone();
        let result = self
            .blocking(move |cancel| {
                let page = feed.recommend(&request, cancel)?;
                let hydrated = items.get_many(&page.item_ids)?;
                Ok(FeedResponse {
                    item_ids: page.item_ids,
                    items: hydrated,
                    has_more: page.has_more,
                    session_id,
                })
            })
            .await;

        from_result(result)
    }

    /// POST /items
    async fn handle_create_item(&self, req: Request<Incoming>, user_id: Option<i64>) -> HttpResponse {
        let owner = match authenticated(user_id) {
            Ok(id) => id,
            Err(e) => return error_response(e),
        };
        let mut input: CreateItemInput = match read_json(req).await {
            Ok(v) => v,
            Err(e) => return error_response(e),
        };
        input.owner_id = owner;

        let items = self.services.items.clone();
        from_create_result(self.blocking(move |_| items.create(&input)).await)
    }

    /// POST /users
    async fn handle_create_user(&self, req: Request<Incoming>) -> HttpResponse {
        let body: CreateUserBody = match read_json(req).await {
            Ok(v) => v,
            Err(e) => return error_response(e),
        };

        let follows = self.services.follows.clone();
        from_create_result(self.blocking(move |_| follows.create_user(&body.username)).await)
    }

    /// PATCH /items/{id}
    async fn handle_update_item(&self, req: Request<Incoming>, item_id: i64, user_id: Option<i64>) -> HttpResponse {
        let actor = match authenticated(user_id) {
            Ok(id) => id,
            Err(e) => return error_response(e),
        };
        let patch: ItemPatch = match read_json(req).await {
            Ok(v) => v,
            Err(e) => return error_response(e),
        };

        let items = self.services.items.clone();
        from_result(self.blocking(move |_| items.update(actor, item_id, &patch)).await)
    }

    /// GET /items/search
    async fn handle_search(&self, query: Option<&str>) -> HttpResponse {
        let query: SearchQuery = match parse_query(query) {
            Ok(q) => q,
            Err(e) => return error_response(e),
        };
        let (limit, offset) = list_bounds(query.limit, query.offset);

        let items = self.services.items.clone();
        from_result(self.blocking(move |_| items.search(&query.q, limit, offset)).await)
    }

    /// POST /items/{id}/interactions
    async fn handle_record_interaction(
        &self,
        req: Request<Incoming>,
        item_id: i64,
        user_id: Option<i64>,
    ) -> HttpResponse {
        let user = match authenticated(user_id) {
            Ok(id) => id,
            Err(e) => return error_response(e),
        };
        let mut input: RecordInteractionInput = match read_json(req).await {
            Ok(v) => v,
            Err(e) => return error_response(e),
        };
        input.user_id = user;
        input.item_id = item_id;

        let interactions = self.services.interactions.clone();
        from_create_result(self.blocking(move |_| interactions.record(&input)).await)
    }

    /// POST /items/{id}/comments
    async fn handle_add_comment(&self, req: Request<Incoming>, item_id: i64, user_id: Option<i64>) -> HttpResponse {
        let user = match authenticated(user_id) {
            Ok(id) => id,
            Err(e) => return error_response(e),
        };
        let mut input: CreateCommentInput = match read_json(req).await {
            Ok(v) => v,
            Err(e) => return error_response(e),
        };
        input.user_id = user;
        input.item_id = item_id;

        let items = self.services.items.clone();
        from_create_result(self.blocking(move |_| items.add_comment(&input)).await)
    }

    /// GET /users/{id}/interactions?type&limit&offset
    async fn handle_user_interactions(&self, query: Option<&str>, target: i64) -> HttpResponse {
        let query: PageQuery = match parse_query(query) {
            Ok(q) => q,
            Err(e) => return error_response(e),
        };
        let (limit, offset) = list_bounds(query.limit, query.offset);
        let filter = query.interaction_type;

        let interactions = self.services.interactions.clone();
        from_result(
            self.blocking(move |_| interactions.list_by_user(target, filter, limit, offset))
                .await,
        )
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Run synchronous service work on the blocking pool under the request deadline
    ///
    /// The token is cancelled when the deadline passes or when this future
    /// is dropped (client went away). Only work that polls the token stops
    /// early; a transaction already running on the blocking pool commits
    /// even after the caller has been answered with 504.
    async fn blocking<T, F>(&self, f: F) -> Result<T, FeedError>
    where
        F: FnOnce(&CancellationToken) -> Result<T, FeedError> + Send + 'static,
        T: Send + 'static,
    {
        let token = CancellationToken::new();
        let _guard = token.clone().drop_guard();
        let worker_token = token.clone();

        let handle = tokio::task::spawn_blocking(move || f(&worker_token));

        match tokio::time::timeout(self.request_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(FeedError::Internal(format!("Worker task failed: {}", join_err))),
            Err(_) => {
                token.cancel();
                warn!(timeout_ms = self.request_timeout.as_millis() as u64, "Request deadline exceeded");
                Err(FeedError::Cancelled)
            }
        }
    }
}

fn caller_id<B>(req: &Request<B>) -> Result<Option<i64>, FeedError> {
    match req.headers().get(USER_ID_HEADER) {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| FeedError::Validation("X-User-Id must be ASCII".into()))?;
            let id: i64 = raw
                .trim()
                .parse()
                .map_err(|_| FeedError::Validation(format!("X-User-Id '{}' is not a valid id", raw)))?;
            if id <= 0 {
                return Err(FeedError::Validation("X-User-Id must be positive".into()));
            }
            Ok(Some(id))
        }
    }
}

fn authenticated(user_id: Option<i64>) -> Result<i64, FeedError> {
    user_id.ok_or(FeedError::Unauthenticated)
}

fn parse_id(raw: &str) -> Result<i64, FeedError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| FeedError::Validation(format!("'{}' is not a valid id", raw)))
}

fn parse_query<T: DeserializeOwned + Default>(query: Option<&str>) -> Result<T, FeedError> {
    match query {
        None | Some("") => Ok(T::default()),
        Some(q) => serde_urlencoded::from_str(q).map_err(|e| FeedError::Validation(format!("Invalid query: {}", e))),
    }
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, FeedError> {
    let body = req
        .collect()
        .await
        .map_err(|e| FeedError::Internal(format!("Failed to read body: {}", e)))?
        .to_bytes();
    Ok(serde_json::from_slice(&body)?)
}
