use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::Router;

use crate::{
    api,
    clients::{
        CatalogClient, CatalogClientConfig, CatalogSearch, GenerativeClient, PlaylistSink,
    },
    config::Config,
    observability::Telemetry,
    pipeline::{Capabilities, PipelineOrchestrator, embedding::EmbeddingService},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    pipeline: Arc<PipelineOrchestrator>,
    catalog: Arc<dyn CatalogSearch>,
    playlists: Arc<dyn PlaylistSink>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn pipeline(&self) -> &PipelineOrchestrator {
        &self.registry.pipeline
    }

    pub(crate) fn catalog(&self) -> &dyn CatalogSearch {
        self.registry.catalog.as_ref()
    }

    pub(crate) fn playlists(&self) -> &dyn PlaylistSink {
        self.registry.playlists.as_ref()
    }
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// 埋め込みモデルはここで一度だけロードする。ロード失敗は起動失敗。
    ///
    /// # Errors
    /// Telemetry の初期化、HTTP クライアント構築、埋め込みモデルのロードが失敗した場合。
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;

        let generator = Arc::new(
            GenerativeClient::new(
                config.llm_base_url(),
                config.llm_api_key(),
                config.llm_model(),
                config.llm_timeout(),
            )
            .context("failed to build generative client")?,
        );
        let catalog = Arc::new(
            CatalogClient::new(CatalogClientConfig {
                api_base_url: config.catalog_api_base_url().to_string(),
                auth_url: config.catalog_auth_url().to_string(),
                client_id: config.catalog_client_id().to_string(),
                client_secret: config.catalog_client_secret().to_string(),
                timeout: config.catalog_timeout(),
                max_retries: config.http_max_retries(),
                backoff_base_ms: config.http_backoff_base_ms(),
                backoff_cap_ms: config.http_backoff_cap_ms(),
            })
            .context("failed to build catalog client")?,
        );

        let model = config.embedding_model();
        let started = Instant::now();
        let embedder = tokio::task::spawn_blocking(move || EmbeddingService::new(model))
            .await
            .context("embedding model loader panicked")??;
        tracing::info!(
            model = model.as_str(),
            elapsed_ms = started.elapsed().as_millis(),
            "embedding model loaded"
        );

        let pipeline = PipelineOrchestrator::from_config(
            &config,
            Capabilities {
                generator,
                search: Arc::clone(&catalog) as Arc<dyn CatalogSearch>,
                metadata: Arc::clone(&catalog) as _,
                embedder: Arc::new(embedder),
            },
            telemetry.metrics(),
        )?;

        Ok(Self::from_parts(
            config,
            telemetry,
            Arc::new(pipeline),
            Arc::clone(&catalog) as _,
            catalog,
        ))
    }

    /// 構築済みの部品からレジストリを組み立てる。
    #[must_use]
    pub fn from_parts(
        config: Arc<Config>,
        telemetry: Telemetry,
        pipeline: Arc<PipelineOrchestrator>,
        catalog: Arc<dyn CatalogSearch>,
        playlists: Arc<dyn PlaylistSink>,
    ) -> Self {
        Self {
            config,
            telemetry,
            pipeline,
            catalog,
            playlists,
        }
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn pipeline(&self) -> Arc<PipelineOrchestrator> {
        Arc::clone(&self.pipeline)
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}
