use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use docrelay::auth::jwt::JwtService;
use docrelay::config::AppConfig;
use docrelay::db::{self, PgPool};
use docrelay::jobs::JOB_DISPATCH_WEBHOOK;
use docrelay::models::Job;
use docrelay::routes;
use docrelay::state::AppState;
use docrelay::storage::FileStore;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const TEST_SIGNUP_CODE: &str = "test-signup-code";

#[derive(Default)]
pub struct FakeFiles {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl FileStore for FakeFiles {
    async fn save(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(name);
        Ok(())
    }
}

impl FakeFiles {
    #[allow(dead_code)]
    pub async fn contains(&self, name: &str) -> bool {
        let guard = self.objects.lock().await;
        guard.contains_key(name)
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    files: Arc<FakeFiles>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        // Nothing listens on the discard port; dispatch tests override this.
        Self::with_webhook_url("http://127.0.0.1:9/webhook").await
    }

    pub async fn with_webhook_url(webhook_url: &str) -> Result<Self> {
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
            callback_token_audience: "test-callback".to_string(),
            callback_token_expiry_minutes: 60,
            signup_code: TEST_SIGNUP_CODE.to_string(),
            webhook_url: webhook_url.to_string(),
            webhook_timeout_secs: 2,
            public_base_url: "http://127.0.0.1:3000".to_string(),
            uploads_dir: "uploads".to_string(),
            cors_allowed_origin: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let files = Arc::new(FakeFiles::default());
        let files_for_state: Arc<dyn FileStore> = files.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, files_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            files,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn files(&self) -> Arc<FakeFiles> {
        self.files.clone()
    }

    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<()> {
        #[derive(Serialize)]
        struct SignupPayload<'a> {
            username: &'a str,
            email: &'a str,
            password: &'a str,
            security_code: &'a str,
        }

        let response = self
            .post_json(
                "/signup",
                &SignupPayload {
                    username,
                    email,
                    password,
                    security_code: TEST_SIGNUP_CODE,
                },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "signup failed with status {}",
            response.status()
        );
        Ok(())
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        let body = format!(
            "username={}&password={}",
            form_encode(email),
            form_encode(password)
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))?;
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response");

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }
        let parsed: TokenResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
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
    pub async fn upload_document(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
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
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload_and_convert")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn dispatch_jobs(&self) -> Result<Vec<Job>> {
        self.with_conn(move |conn| {
            use docrelay::schema::jobs::dsl::{job_type, jobs};
            let rows = jobs
                .filter(job_type.eq(JOB_DISPATCH_WEBHOOK))
                .load::<Job>(conn)
                .context("failed to load dispatch jobs")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn reserve_dispatch_job(&self) -> Result<Option<Job>> {
        self.with_conn(|conn| {
            docrelay::jobs::reserve_job(conn, &[JOB_DISPATCH_WEBHOOK])
                .map_err(|err| anyhow!("failed to reserve job: {err}"))
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn document_status(&self, document_id: Uuid) -> Result<(String, Option<String>)> {
        self.with_conn(move |conn| {
            use docrelay::schema::documents::dsl::{documents, id, status, status_detail};
            let row = documents
                .filter(id.eq(document_id))
                .select((status, status_detail))
                .first::<(String, Option<String>)>(conn)
                .context("failed to load document status")?;
            Ok(row)
        })
        .await
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
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

fn form_encode(value: &str) -> String {
    value.replace('@', "%40").replace('+', "%2B")
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

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE document_tags, document_versions, documents, tags, jobs, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
