// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message path of the Palaver session gateway.
//!
//! Inbound batches from a session flow through the [`IngestionPipeline`]
//! (scope filter, classification, address resolution, deduplicated history,
//! chat summaries, media offload) and, for live inbound messages, on to the
//! [`AutoResponder`]. The responder consults the [`DecisionEngine`], asks the
//! reply generator, and sends through the [`NaturalReplySimulator`] and the
//! [`OutboundDispatcher`]. [`Runtime`] wires it all to a
//! [`SessionManager`](palaver_session::SessionManager).

pub mod address;
pub mod blob;
pub mod chats;
pub mod decision;
pub mod dispatch;
pub mod ingest;
pub mod media;
pub mod normalize;
pub mod responder;
pub mod runtime;
pub mod timing;

pub use address::{AddressResolver, Resolution, ResolvedAddress};
pub use blob::LocalBlobStore;
pub use chats::{ChatControls, AI_HANDOVER_ACTOR};
pub use decision::{should_auto_reply, should_use_ai, DecisionEngine, ReplyDecision};
pub use dispatch::{DispatchPolicy, OutboundDispatcher, SentMessage};
pub use ingest::{IngestOutcome, IngestedMessage, IngestionPipeline, SkipReason};
pub use media::{normalize_image, MediaOffloader, NormalizedImage};
pub use responder::{AutoResponder, ResponseOutcome, SkipCause};
pub use runtime::{MessageRouter, Runtime, RuntimeBuilder};
pub use timing::{NaturalReplySimulator, ReplyTiming};
