use std::collections::{HashMap, VecDeque};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use backstage::ai::{GenerativeModel, ModelError, ModelResult, TextStream};
use backstage::auth::jwt::JwtService;
use backstage::auth::password;
use backstage::config::AppConfig;
use backstage::db::{self, PgPool};
use backstage::models::{ChatMessage, NewEventUser, NewUser};
use backstage::routes;
use backstage::state::AppState;
use backstage::storage::ObjectStorage;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use futures_util::{stream, StreamExt};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type: content_type.to_string(),
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard
            .get(key)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

/// Scripted stand-in for the model provider. Responses are consumed in push
/// order; an exhausted script answers with a fixed placeholder so unrelated
/// tests never hit the network.
#[derive(Default)]
pub struct MockModel {
    responses: StdMutex<VecDeque<Result<String, String>>>,
    prompts: StdMutex<Vec<(String, String)>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockModel {
    pub fn push_response(&self, text: &str) {
        self.responses
            .lock()
            .expect("mock model lock")
            .push_back(Ok(text.to_string()));
    }

    pub fn push_failure(&self, message: &str) {
        self.responses
            .lock()
            .expect("mock model lock")
            .push_back(Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts.lock().expect("mock model lock").last().cloned()
    }

    fn next(&self, system: &str, prompt: &str) -> ModelResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("mock model lock")
            .push((system.to_string(), prompt.to_string()));
        match self
            .responses
            .lock()
            .expect("mock model lock")
            .pop_front()
        {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ModelError::Request(message)),
            None => Ok("mock response".to_string()),
        }
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    async fn generate(&self, system: &str, prompt: &str) -> ModelResult<String> {
        self.next(system, prompt)
    }

    async fn generate_stream(&self, system: &str, prompt: &str) -> ModelResult<TextStream> {
        let text = self.next(system, prompt)?;
        let fragments: Vec<ModelResult<String>> = text
            .split_inclusive(' ')
            .map(|fragment| Ok(fragment.to_string()))
            .collect();
        Ok(stream::iter(fragments).boxed())
    }

    async fn generate_structured(
        &self,
        system: &str,
        prompt: &str,
        _schema: serde_json::Value,
    ) -> ModelResult<String> {
        self.next(system, prompt)
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    model: Arc<MockModel>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            gemini_api_key: "test-key".to_string(),
            gemini_base_url: "http://127.0.0.1:9".to_string(),
            gemini_model: "test-model".to_string(),
        };

        let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let model = Arc::new(MockModel::default());
        let model_for_state: Arc<dyn GenerativeModel> = model.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, storage_for_state, model_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            model,
        })
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn model(&self) -> Arc<MockModel> {
        self.model.clone()
    }

    pub async fn insert_user(&self, email: &str, password_value: &str) -> Result<Uuid> {
        let email = email.to_string();
        let password_value = password_value.to_string();
        self.with_conn(move |conn| {
            let password_hash = password::hash_password(&password_value)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                email,
                password_hash,
                full_name: None,
            };
            diesel::insert_into(backstage::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password_value: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload {
                    email,
                    password: password_value,
                },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    /// POSTs an event as the given token and returns the new event id.
    #[allow(dead_code)]
    pub async fn create_event(&self, token: &str, name: &str) -> Result<Uuid> {
        let response = self
            .post_json(
                "/api/events",
                &serde_json::json!({
                    "name": name,
                    "date": "2025-11-30T21:00:00Z",
                    "location": "Main Hall",
                }),
                Some(token),
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "event creation failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        let parsed: serde_json::Value = serde_json::from_slice(&body)?;
        let id = parsed["event"]["id"]
            .as_str()
            .context("event id missing from creation response")?;
        Ok(Uuid::parse_str(id)?)
    }

    /// Grants `role` on the event directly, bypassing the API (there is no
    /// member-management endpoint; assignments are seeded by tests).
    #[allow(dead_code)]
    pub async fn assign_role(&self, event_id: Uuid, user_id: Uuid, role: &str) -> Result<()> {
        let role = role.to_string();
        self.with_conn(move |conn| {
            let assignment = NewEventUser {
                event_id,
                user_id,
                role,
                added_by: None,
            };
            diesel::insert_into(backstage::schema::event_users::table)
                .values(&assignment)
                .execute(conn)
                .context("failed to insert role assignment")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn chat_messages(&self, user_id: Uuid, event_id: Uuid) -> Result<Vec<ChatMessage>> {
        self.with_conn(move |conn| {
            use backstage::schema::chat_messages::dsl;
            let rows = dsl::chat_messages
                .filter(dsl::user_id.eq(user_id))
                .filter(dsl::event_id.eq(event_id))
                .order(dsl::created_at.asc())
                .load::<ChatMessage>(conn)
                .context("failed to load chat messages")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn event_files(&self, event_id: Uuid) -> Result<Vec<backstage::models::EventFile>> {
        self.with_conn(move |conn| {
            use backstage::schema::event_files::dsl;
            let rows = dsl::event_files
                .filter(dsl::event_id.eq(event_id))
                .order(dsl::uploaded_at.asc())
                .load(conn)
                .context("failed to load event files")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn file_count(&self, event_id: Uuid) -> Result<i64> {
        self.with_conn(move |conn| {
            use backstage::schema::event_files::dsl;
            dsl::event_files
                .filter(dsl::event_id.eq(event_id))
                .count()
                .get_result(conn)
                .context("failed to count files")
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn timeline_cache_count(&self, event_id: Uuid) -> Result<i64> {
        self.with_conn(move |conn| {
            use backstage::schema::event_timelines::dsl;
            dsl::event_timelines
                .filter(dsl::event_id.eq(event_id))
                .count()
                .get_result(conn)
                .context("failed to count cached timelines")
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.request_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.request_json(Method::PUT, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn delete_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.request_json(Method::DELETE, path, payload, token).await
    }

    async fn request_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn upload_file(
        &self,
        event_id: Uuid,
        filename: &str,
        content_type: &str,
        data: &[u8],
        category: &str,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(b"Content-Disposition: form-data; name=\"category\"\r\n\r\n");
        body.extend(category.as_bytes());
        body.extend(b"\r\n");

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let builder = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/events/{event_id}/upload"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"));

        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

// Categories are migration-seeded reference data and deliberately survive.
fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE chat_messages, event_timelines, timeline_entries, event_files, event_users, events, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
