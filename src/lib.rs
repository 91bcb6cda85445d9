//! bevy_medchat: a medical research assistant chat over the `llm` crate.
//!
//! - `Session` owns the transcript, the draft line, and the
//!   one-request-in-flight gate; the provider never keeps history.
//! - the completion gateway absorbs every provider failure into a fixed
//!   fallback reply, so the ui never hangs on a failed call.
//! - never blocks the main thread: on native we spawn onto a tiny tokio
//!   runtime (no bevy pool blocking); on wasm we use bevy's async pool,
//!   which yields to the browser/event loop.
//!
//! typical wiring: insert a [`CompletionGateway`], add [`MedChatPlugin`],
//! spawn an entity with a [`Session`], then drive it with [`submit_text`]
//! (or an [`InitialQuery`] resource for query-parameter auto-submission).

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use flume::{Receiver, Sender, TryRecvError};
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;

pub mod format;
pub mod gateway;
pub mod query;
pub mod session;

pub use format::{split_paragraphs, split_paragraphs_default, DEFAULT_PARAGRAPH_LEN};
pub use gateway::{
    CompletionBackend, CompletionGateway, GatewayError, LlmBackend, FALLBACK_REPLY,
};
pub use query::{QUERY_ENV_VAR, QUERY_PARAM};
pub use session::{Role, Session, Turn, SYSTEM_INSTRUCTION};

/// on native we keep a tiny tokio runtime to drive `llm` futures.
/// we spawn onto this rt from compute tasks so neither the main thread
/// nor bevy's compute pools block.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_medchat", "initializing tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so uis can run after replies land.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum MedChatSet {
    /// replies are applied to sessions and `ReplyReceived` fires here
    /// (in `Update`)
    Drain,
}

/// insert this component on a session entity to request a send. removed once
/// picked up; an empty or mid-flight submission is dropped without a call.
#[derive(Component, Clone, Debug)]
pub struct SubmitText(pub String);

/// helper to enqueue a user message on a session entity.
pub fn submit_text(commands: &mut Commands, target: Entity, text: impl Into<String>) {
    let text = text.into();
    info!(target: "bevy_medchat", "submit_text -> len={}", text.len());
    commands.entity(target).insert(SubmitText(text));
}

/// decoded query-parameter message to auto-submit once a session exists.
/// consumed on application (see `query::initial_message_from_location` /
/// `query::initial_message_from_env` for producing it).
#[derive(Resource, Clone, Debug)]
pub struct InitialQuery(pub String);

/// a user turn was appended and the outbound call is starting.
#[derive(Event, Debug)]
pub struct TurnSubmitted {
    pub entity: Entity,
}

/// the assistant turn landed (provider reply or fallback text).
#[derive(Event, Debug)]
pub struct ReplyReceived {
    pub entity: Entity,
    pub text: String,
}

/// cross-thread inbox for finished completions; gateway tasks send, the main
/// thread drains. bounded to avoid unbounded growth when the frame stalls.
#[derive(Resource, Clone)]
struct ReplyInbox {
    tx: Sender<ReplyMsg>,
    rx: Receiver<ReplyMsg>,
}

impl Default for ReplyInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(256);
        Self { tx, rx }
    }
}

#[derive(Debug)]
struct ReplyMsg {
    entity: Entity,
    text: String,
}

/// bevy plugin: wires systems, events, resources.
/// requires a `CompletionGateway` resource before any submission is made.
/// on native, also inserts a tiny tokio runtime resource by default.
pub struct MedChatPlugin;

impl Plugin for MedChatPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_medchat", "MedChatPlugin: build()");
        app.init_resource::<ReplyInbox>()
            .add_event::<TurnSubmitted>()
            .add_event::<ReplyReceived>()
            // write + read events in the same schedule (Update)
            .configure_sets(Update, MedChatSet::Drain)
            .add_systems(Update, drain_reply_inbox.in_set(MedChatSet::Drain))
            // the initial query goes first so a same-frame manual submit
            // cannot slip in ahead of it
            .add_systems(
                Update,
                (apply_initial_query, spawn_completion_requests).chain(),
            );

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

/// runs the gateway call off the main thread and posts the reply (always
/// text, never an error) into the inbox.
#[cfg(not(target_arch = "wasm32"))]
fn dispatch_prompt(
    gateway: &CompletionGateway,
    tx: Sender<ReplyMsg>,
    entity: Entity,
    prompt: Vec<Turn>,
    rt: Arc<tokio::runtime::Runtime>,
) {
    let gateway = gateway.clone();
    AsyncComputeTaskPool::get()
        .spawn(async move {
            // hand off to tokio so bevy pools stay free while the http
            // request is in flight
            let _ = rt
                .spawn(async move {
                    let text = gateway.complete(&prompt).await;
                    let _ = tx.send(ReplyMsg { entity, text });
                })
                .await;
        })
        .detach();
}

#[cfg(target_arch = "wasm32")]
fn dispatch_prompt(
    gateway: &CompletionGateway,
    tx: Sender<ReplyMsg>,
    entity: Entity,
    prompt: Vec<Turn>,
) {
    let gateway = gateway.clone();
    AsyncComputeTaskPool::get()
        .spawn(async move {
            // wasm path: await directly; the pool yields to the event loop
            let text = gateway.complete(&prompt).await;
            let _ = tx.send(ReplyMsg { entity, text });
        })
        .detach();
}

/// picks up `SubmitText` markers, gates them through `Session::submit`, and
/// spawns the gateway call for accepted submissions.
fn spawn_completion_requests(
    mut commands: Commands,
    gateway: Res<CompletionGateway>,
    inbox: Res<ReplyInbox>,
    mut q: Query<(Entity, &mut Session, &SubmitText)>,
    mut ev_submitted: EventWriter<TurnSubmitted>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for (e, mut session, submit) in q.iter_mut() {
        let text = submit.0.clone();
        // one-shot marker removal
        commands.entity(e).remove::<SubmitText>();

        let Some(prompt) = session.submit(&text) else {
            debug!(target: "bevy_medchat", "submit dropped: entity={e:?} (empty or reply pending)");
            continue;
        };
        info!(target: "bevy_medchat", "submit: entity={e:?} prompt_turns={}", prompt.len());
        ev_submitted.write(TurnSubmitted { entity: e });

        #[cfg(not(target_arch = "wasm32"))]
        dispatch_prompt(&gateway, inbox.tx.clone(), e, prompt, rt.0.clone());
        #[cfg(target_arch = "wasm32")]
        dispatch_prompt(&gateway, inbox.tx.clone(), e, prompt);
    }
}

/// auto-submits the decoded query-parameter message once, as soon as a
/// session entity exists. the resource is consumed on application.
fn apply_initial_query(
    mut commands: Commands,
    initial: Option<Res<InitialQuery>>,
    gateway: Option<Res<CompletionGateway>>,
    inbox: Res<ReplyInbox>,
    mut q: Query<(Entity, &mut Session)>,
    mut ev_submitted: EventWriter<TurnSubmitted>,
    #[cfg(not(target_arch = "wasm32"))] rt: Option<Res<TokioRt>>,
) {
    let Some(initial) = initial else {
        return;
    };
    let Some(gateway) = gateway else {
        return;
    };
    #[cfg(not(target_arch = "wasm32"))]
    let Some(rt) = rt else {
        return;
    };
    // wait until a session entity has been spawned
    let Some((e, mut session)) = q.iter_mut().next() else {
        return;
    };

    let text = initial.0.clone();
    commands.remove_resource::<InitialQuery>();

    let Some(prompt) = session.initialize_from_query(&text) else {
        debug!(target: "bevy_medchat", "initial query dropped: entity={e:?}");
        return;
    };
    info!(target: "bevy_medchat", "initial query submitted: entity={e:?} len={}", text.len());
    ev_submitted.write(TurnSubmitted { entity: e });

    #[cfg(not(target_arch = "wasm32"))]
    dispatch_prompt(&gateway, inbox.tx.clone(), e, prompt, rt.0.clone());
    #[cfg(target_arch = "wasm32")]
    dispatch_prompt(&gateway, inbox.tx.clone(), e, prompt);
}

/// drains the inbox, resolves sessions, and emits `ReplyReceived`.
fn drain_reply_inbox(
    inbox: Res<ReplyInbox>,
    mut q: Query<&mut Session>,
    mut ev_reply: EventWriter<ReplyReceived>,
) {
    // cap per frame so a burst of replies cannot stall rendering
    const MAX_PER_FRAME: usize = 64;
    for _ in 0..MAX_PER_FRAME {
        match inbox.rx.try_recv() {
            Ok(ReplyMsg { entity, text }) => {
                if let Ok(mut session) = q.get_mut(entity) {
                    session.resolve(text.clone());
                } else {
                    // session entity despawned while the call was in flight
                    warn!(target: "bevy_medchat", "reply for missing entity {entity:?} dropped");
                }
                ev_reply.write(ReplyReceived { entity, text });
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}
