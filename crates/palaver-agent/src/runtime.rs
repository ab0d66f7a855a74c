// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process wiring.
//!
//! [`RuntimeBuilder`] takes the external collaborators and the loaded
//! configuration and assembles the session manager, the ingestion and
//! reply path, and the operator-facing controls.

use std::sync::Arc;

use async_trait::async_trait;
use palaver_config::PalaverConfig;
use palaver_core::protocol::{MessageBatch, OutgoingContent};
use palaver_core::{
    BlobStore, CampaignDirectory, PalaverError, ProtocolClientFactory, ProtocolHandle,
    ReplyGenerator, StorageAdapter,
};
use palaver_session::{ManagerSettings, MessageEventHandler, ObserverHub, SessionManager};
use tracing::{debug, info, warn};

use crate::blob::LocalBlobStore;
use crate::chats::ChatControls;
use crate::decision::DecisionEngine;
use crate::dispatch::{DispatchPolicy, OutboundDispatcher, SentMessage};
use crate::ingest::IngestionPipeline;
use crate::media::MediaOffloader;
use crate::responder::AutoResponder;
use crate::timing::NaturalReplySimulator;

/// Campaign directory used when none is configured: nothing is warming.
struct NoCampaigns;

#[async_trait]
impl CampaignDirectory for NoCampaigns {
    async fn is_in_active_warming(&self, _session_id: &str) -> Result<bool, PalaverError> {
        Ok(false)
    }
}

/// Receives message batches from the session manager: ingest, then reply.
pub struct MessageRouter {
    pipeline: Arc<IngestionPipeline>,
    responder: Arc<AutoResponder>,
}

impl MessageRouter {
    pub fn new(pipeline: Arc<IngestionPipeline>, responder: Arc<AutoResponder>) -> Self {
        Self {
            pipeline,
            responder,
        }
    }
}

#[async_trait]
impl MessageEventHandler for MessageRouter {
    async fn on_messages(
        &self,
        session_id: &str,
        handle: Arc<dyn ProtocolHandle>,
        batch: MessageBatch,
    ) {
        let ingested = self.pipeline.ingest_batch(session_id, &handle, &batch).await;
        for message in ingested.into_iter().filter(|m| m.reply_eligible) {
            let responder = self.responder.clone();
            let handle = handle.clone();
            // Replies wait out a typing delay; never block the event pump on them.
            tokio::spawn(async move {
                match responder.respond(handle, &message).await {
                    Ok(outcome) => debug!(
                        session_id = %message.message.session_id,
                        chat = %message.message.chat_jid,
                        ?outcome,
                        "auto-reply handled"
                    ),
                    Err(e) => warn!(
                        session_id = %message.message.session_id,
                        chat = %message.message.chat_jid,
                        error = %e,
                        "auto-reply failed"
                    ),
                }
            });
        }
    }
}

pub struct RuntimeBuilder {
    config: PalaverConfig,
    storage: Option<Arc<dyn StorageAdapter>>,
    factory: Option<Arc<dyn ProtocolClientFactory>>,
    generator: Option<Arc<dyn ReplyGenerator>>,
    campaigns: Option<Arc<dyn CampaignDirectory>>,
    blobs: Option<Arc<dyn BlobStore>>,
    observers: Option<Arc<ObserverHub>>,
}

impl RuntimeBuilder {
    pub fn new(config: PalaverConfig) -> Self {
        Self {
            config,
            storage: None,
            factory: None,
            generator: None,
            campaigns: None,
            blobs: None,
            observers: None,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn protocol(mut self, factory: Arc<dyn ProtocolClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn ReplyGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Defaults to a directory with no warming campaigns.
    pub fn campaigns(mut self, campaigns: Arc<dyn CampaignDirectory>) -> Self {
        self.campaigns = Some(campaigns);
        self
    }

    /// Defaults to a [`LocalBlobStore`] under `media.blob_dir`.
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn observers(mut self, observers: Arc<ObserverHub>) -> Self {
        self.observers = Some(observers);
        self
    }

    pub fn build(self) -> Result<Runtime, PalaverError> {
        let storage = self
            .storage
            .ok_or_else(|| PalaverError::Config("runtime needs a storage adapter".into()))?;
        let factory = self
            .factory
            .ok_or_else(|| PalaverError::Config("runtime needs a protocol client factory".into()))?;
        let generator = self
            .generator
            .ok_or_else(|| PalaverError::Config("runtime needs a reply generator".into()))?;
        let campaigns = self
            .campaigns
            .unwrap_or_else(|| Arc::new(NoCampaigns) as Arc<dyn CampaignDirectory>);
        let config = self.config;
        let blobs = self.blobs.unwrap_or_else(|| {
            Arc::new(LocalBlobStore::new(&config.media.blob_dir)) as Arc<dyn BlobStore>
        });
        let observers = self.observers.unwrap_or_default();

        let sessions = SessionManager::new(
            storage.clone(),
            factory,
            observers.clone(),
            ManagerSettings::from(&config.connection),
        );

        let offloader = config.media.offload_images.then(|| {
            Arc::new(MediaOffloader::new(
                storage.clone(),
                blobs.clone(),
                config.media.clone(),
            ))
        });
        let dispatcher = Arc::new(OutboundDispatcher::new(
            storage.clone(),
            observers.clone(),
            offloader.clone(),
            DispatchPolicy::from(&config.dispatch),
        ));
        let chats = ChatControls::new(storage.clone(), observers.clone());
        let pipeline = Arc::new(IngestionPipeline::new(
            storage.clone(),
            observers.clone(),
            offloader,
        ));
        let simulator = NaturalReplySimulator::new(dispatcher.clone(), &config.reply)
            .with_sessions(sessions.clone());
        let responder = Arc::new(AutoResponder::new(
            storage.clone(),
            DecisionEngine::new(campaigns),
            generator,
            simulator,
            dispatcher.clone(),
            chats.clone(),
            Some(blobs),
            config.reply.clone(),
        ));

        sessions.set_message_handler(Arc::new(MessageRouter::new(
            pipeline.clone(),
            responder.clone(),
        )))?;

        Ok(Runtime {
            config,
            storage,
            sessions,
            dispatcher,
            chats,
            pipeline,
            responder,
        })
    }
}

/// A fully wired gateway.
pub struct Runtime {
    config: PalaverConfig,
    storage: Arc<dyn StorageAdapter>,
    sessions: SessionManager,
    dispatcher: Arc<OutboundDispatcher>,
    chats: ChatControls,
    pipeline: Arc<IngestionPipeline>,
    responder: Arc<AutoResponder>,
}

impl Runtime {
    pub fn builder(config: PalaverConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &PalaverConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn dispatcher(&self) -> &Arc<OutboundDispatcher> {
        &self.dispatcher
    }

    pub fn chats(&self) -> &ChatControls {
        &self.chats
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    pub fn responder(&self) -> &Arc<AutoResponder> {
        &self.responder
    }

    /// Resume every session that was live when the process last stopped.
    pub async fn start(&self) -> Result<usize, PalaverError> {
        let resumed = self.sessions.resume_all().await?;
        info!(resumed, "runtime started");
        Ok(resumed)
    }

    /// Send an operator message through a session's live connection.
    pub async fn send_message(
        &self,
        session_id: &str,
        to: &str,
        content: OutgoingContent,
    ) -> Result<SentMessage, PalaverError> {
        let handle = self.sessions.current_handle(session_id)?;
        self.dispatcher
            .send(handle.as_ref(), session_id, to, content, false)
            .await
    }

    /// End every live connection and close storage. Persisted statuses are
    /// left as they are so the next start resumes the same sessions.
    pub async fn shutdown(&self) -> Result<(), PalaverError> {
        self.sessions.shutdown().await;
        self.storage.close().await?;
        info!("runtime stopped");
        Ok(())
    }
}
