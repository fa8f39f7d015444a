// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flowbot: a multi-tenant conversational automation server.

pub mod ai_parser;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod flow_engine;
pub mod gateway;
pub mod llm;
pub mod locks;
pub mod queue;
pub mod resolvers;
pub mod scheduler;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::conversation::ConversationRepository;
use crate::dispatcher::Dispatcher;
use crate::flow_engine::FlowEngine;
use crate::gateway::http::HttpProviderGateway;
use crate::gateway::ProviderGateway;
use crate::llm::http::HttpLlmClient;
use crate::llm::LlmClient;
use crate::locks::SessionLockManager;
use crate::queue::memory::MemoryQueue;
use crate::queue::redis::RedisQueue;
use crate::queue::MessageQueue;
use crate::resolvers::{NullDeviceFlowConfig, NullDeviceGatewayConfig, NullDeviceLlmConfig};
use crate::scheduler::Scheduler;
use crate::store::memory::MemoryStore;
use crate::store::mysql::MySqlStore;
use crate::store::Store;
use crate::transport::{build_router, AppState};

/// Run the flowbot server until shutdown.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn Store> = match &config.mysql_uri {
        Some(uri) => {
            tracing::info!("connecting to mysql store");
            Arc::new(MySqlStore::connect(uri, config.store_timeout()).await?)
        }
        None => {
            tracing::warn!("MYSQL_URI unset, running with in-memory store (non-persistent)");
            Arc::new(MemoryStore::new())
        }
    };

    let queue: Arc<dyn MessageQueue> = match &config.redis_url {
        Some(url) => {
            tracing::info!("connecting to redis queue");
            Arc::new(RedisQueue::connect(url)?)
        }
        None => {
            tracing::warn!("REDIS_URL unset, running with in-memory queue (non-persistent)");
            Arc::new(MemoryQueue::new())
        }
    };

    let conversations = Arc::new(ConversationRepository::new(store.clone()));
    let locks = Arc::new(SessionLockManager::new(store.clone(), clock.clone(), config.session_lock_ttl()));

    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(
        config.openrouter_timeout(),
        clock.clone(),
        Arc::new(NullDeviceLlmConfig),
        config.llm_circuit_breaker_threshold,
        config.llm_circuit_breaker_open(),
        config.llm_cache_ttl(),
        config.openrouter_default_key.clone(),
        config.openai_pinned_api_key.clone(),
        config.openrouter_max_retries,
    ));

    let flow_engine = Arc::new(FlowEngine::new(
        store.clone(),
        conversations.clone(),
        queue.clone(),
        llm.clone(),
        clock.clone(),
        config.ai_fallback_text.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        locks.clone(),
        store.clone(),
        conversations.clone(),
        flow_engine.clone(),
        Arc::new(NullDeviceFlowConfig),
        llm.clone(),
        queue.clone(),
    ));

    let gateway: Arc<dyn ProviderGateway> = Arc::new(HttpProviderGateway::new(config.provider_timeout()));

    let scheduler = Arc::new(Scheduler::new(
        queue.clone(),
        gateway,
        Arc::new(NullDeviceGatewayConfig),
        flow_engine,
        locks,
        store.clone(),
        clock,
        config.max_concurrent_users,
        config.scheduler_period(),
    ));
    scheduler.spawn(shutdown.clone());

    let state = Arc::new(AppState {
        dispatcher,
        store,
        conversations,
        llm,
        admin_auth_token: config.admin_auth_token.clone(),
        app_env: config.app_env.clone(),
    });

    tracing::info!("flowbot listening on {addr} (env={})", config.app_env);
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
