//! High-level Unigame client API.
//!
//! Provides `UnigameClient<H>`, which owns a [`SyncEngine`] on a background
//! task and serializes transport events and local commands onto it.
//! Observers follow the session through [`SessionSnapshot`]s.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::{CredentialStore, Preferences, Settings, TokenProvider};
use crate::core::{GameHandler, Player, Scoring, UnigameError};
use crate::sync::{Notice, Phase, SyncEngine};
use crate::transport::{Backends, EventStream, TransportEvent, make_transport};

/// Everything an observer needs to render a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current phase.
    pub phase: Phase,
    /// Roster in order.
    pub players: Vec<Player>,
    /// Index of the local player.
    pub local_index: usize,
    /// Index of the player whose turn it is.
    pub active_player: usize,
    /// Whether the local player may transmit.
    pub my_turn: bool,
    /// Working player count (0 = unknown).
    pub num_players: usize,
    /// Whether the game is draining after a withdrawal.
    pub draining: bool,
    /// Whether a transport is attached.
    pub connected: bool,
    /// Pending notice.
    pub notice: Option<Notice>,
    /// Chat transcript of this game.
    pub chat: Option<Vec<String>>,
    /// Whether unread chat lines exist.
    pub chat_unread: bool,
    /// Scoring mode.
    pub scoring: Scoring,
    /// Settings in effect.
    pub settings: Settings,
}

impl SessionSnapshot {
    fn capture<H: GameHandler>(engine: &SyncEngine<H>) -> Self {
        Self {
            phase: engine.phase(),
            players: engine.roster().players().to_vec(),
            local_index: engine.local_index(),
            active_player: engine.active_player(),
            my_turn: engine.is_my_turn(),
            num_players: engine.num_players(),
            draining: engine.is_draining(),
            connected: engine.has_transport(),
            notice: engine.notice().cloned(),
            chat: engine.chat_transcript().map(<[String]>::to_vec),
            chat_unread: engine.chat_unread(),
            scoring: engine.scoring(),
            settings: engine.settings().clone(),
        }
    }
}

type SettingsChange = Box<dyn FnOnce(&mut Settings) + Send>;
type GameChange<H> = Box<dyn FnOnce(&mut H) + Send>;
type Reply = oneshot::Sender<Result<(), UnigameError>>;

/// Commands to the session task.
enum ClientCommand<H> {
    Connect {
        access_token: Option<String>,
        reply: Reply,
    },
    UpdateSettings {
        change: SettingsChange,
        reply: Reply,
    },
    StartSolitaire,
    NewGame,
    Move,
    Setup,
    Yield,
    Withdraw,
    SendChat(String),
    SetScore {
        index: usize,
        score: i32,
    },
    SetScoring(Scoring),
    WithGame(GameChange<H>),
    AcknowledgeNotice,
    MarkChatRead,
    Shutdown,
}

/// The session task.
struct Driver<H: GameHandler> {
    engine: SyncEngine<H>,
    prefs: Preferences,
    backends: Backends,
    events: Option<EventStream>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl<H: GameHandler> Driver<H> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ClientCommand<H>>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ClientCommand::Shutdown) | None => break,
                    Some(command) => self.execute(command),
                },
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle(event),
                    None => {
                        tracing::debug!("transport event stream closed");
                        self.events = None;
                    }
                },
            }
            if !self.engine.has_transport() {
                self.events = None;
            }
            self.publish();
        }
        tracing::debug!("session task stopping");
        self.engine.new_game();
        self.events = None;
        self.publish();
    }

    fn handle(&mut self, event: TransportEvent) {
        if let Err(err) = self.engine.handle_event(event) {
            tracing::warn!(%err, "session error");
        }
    }

    fn execute(&mut self, command: ClientCommand<H>) {
        match command {
            ClientCommand::Connect {
                access_token,
                reply,
            } => {
                let result = self.connect(access_token);
                self.publish();
                let _ = reply.send(result);
            }
            ClientCommand::UpdateSettings { change, reply } => {
                let result = self.update_settings(change);
                self.publish();
                let _ = reply.send(result);
            }
            ClientCommand::StartSolitaire => {
                self.engine.new_game();
                if !self.engine.start_solitaire() {
                    tracing::debug!("solitaire needs a leader with one player");
                }
            }
            ClientCommand::NewGame => self.engine.new_game(),
            ClientCommand::Move => {
                self.engine.transmit_move();
            }
            ClientCommand::Setup => {
                self.engine.transmit_setup();
            }
            ClientCommand::Yield => {
                self.engine.yield_turn();
            }
            ClientCommand::Withdraw => self.engine.withdraw(),
            ClientCommand::SendChat(text) => self.engine.send_chat(&text),
            ClientCommand::SetScore { index, score } => self.engine.set_score(index, score),
            ClientCommand::SetScoring(scoring) => self.engine.set_scoring(scoring),
            ClientCommand::WithGame(change) => change(self.engine.handler_mut()),
            ClientCommand::AcknowledgeNotice => self.engine.acknowledge_notice(),
            ClientCommand::MarkChatRead => self.engine.mark_chat_read(),
            ClientCommand::Shutdown => {}
        }
    }

    fn connect(&mut self, access_token: Option<String>) -> Result<(), UnigameError> {
        self.engine.new_game();
        let mut config = self.engine.transport_config()?;
        config.access_token = access_token;
        tracing::info!(proximity_only = config.proximity_only, "making transport");
        match make_transport(&config, &self.backends) {
            Ok((transport, events)) => {
                self.engine.attach_transport(transport);
                self.events = Some(events);
                Ok(())
            }
            Err(err) => {
                self.engine.connection_failed(&err);
                Err(err.into())
            }
        }
    }

    fn update_settings(&mut self, change: SettingsChange) -> Result<(), UnigameError> {
        self.prefs.update(change)?;
        self.engine.set_settings(self.prefs.get().clone());
        if !self.engine.has_transport() && !self.engine.play_begun() {
            self.engine.new_game();
        }
        Ok(())
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(SessionSnapshot::capture(&self.engine));
    }
}

async fn next_event(events: &mut Option<EventStream>) -> Option<TransportEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// A Unigame session.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use unigame_protocol::prelude::*;
///
/// let prefs = Preferences::load(MemoryStore::new())?;
/// let backends = Backends::new().with_proximity(Arc::new(Airspace::new()));
/// let client = UnigameClient::spawn(SolitaireHandler::default(), prefs, backends);
///
/// client.update_settings(|s| {
///     s.proximity_only = true;
///     s.use_group_token("friday");
/// }).await?;
/// client.connect(None).await?;
///
/// let mut updates = client.subscribe();
/// updates.wait_for(|s| s.my_turn).await?;
/// client.yield_turn()?;
/// ```
pub struct UnigameClient<H: GameHandler> {
    commands: mpsc::UnboundedSender<ClientCommand<H>>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl<H: GameHandler> UnigameClient<H> {
    /// Start a session task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(handler: H, prefs: Preferences, backends: Backends) -> Self {
        let engine = SyncEngine::new(handler, prefs.get().clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::capture(&engine));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            engine,
            prefs,
            backends,
            events: None,
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(driver.run(command_rx));

        Self {
            commands: command_tx,
            snapshots: snapshot_rx,
            task: Some(task),
        }
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that sees every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    fn send(&self, command: ClientCommand<H>) -> Result<(), UnigameError> {
        self.commands
            .send(command)
            .map_err(|_| UnigameError::SessionClosed)
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> ClientCommand<H>,
    ) -> Result<(), UnigameError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await.map_err(|_| UnigameError::SessionClosed)?
    }

    /// Start a fresh game and look for players.
    ///
    /// The access token is required for the relay and ignored by the
    /// proximity transport.
    pub async fn connect(&self, access_token: Option<String>) -> Result<(), UnigameError> {
        self.request(|reply| ClientCommand::Connect {
            access_token,
            reply,
        })
        .await
    }

    /// Obtain credentials if the relay will need them, then connect.
    pub async fn login_and_connect<P: TokenProvider>(
        &self,
        store: &CredentialStore,
        provider: &P,
    ) -> Result<(), UnigameError> {
        let access_token = if self.snapshot().settings.proximity_only {
            None
        } else {
            Some(store.login_if_needed(provider).await?.access_token)
        };
        self.connect(access_token).await
    }

    /// Change and persist settings.
    pub async fn update_settings(
        &self,
        change: impl FnOnce(&mut Settings) + Send + 'static,
    ) -> Result<(), UnigameError> {
        self.request(|reply| ClientCommand::UpdateSettings {
            change: Box::new(change),
            reply,
        })
        .await
    }

    /// Start a one-player game.
    pub fn start_solitaire(&self) -> Result<(), UnigameError> {
        self.send(ClientCommand::StartSolitaire)
    }

    /// Abandon the current game.
    pub fn new_game(&self) -> Result<(), UnigameError> {
        self.send(ClientCommand::NewGame)
    }

    /// Transmit the game state, keeping the turn.
    pub fn transmit_move(&self) -> Result<(), UnigameError> {
        self.send(ClientCommand::Move)
    }

    /// Transmit the leader's setup.
    pub fn transmit_setup(&self) -> Result<(), UnigameError> {
        self.send(ClientCommand::Setup)
    }

    /// Transmit the game state and pass the turn on.
    pub fn yield_turn(&self) -> Result<(), UnigameError> {
        self.send(ClientCommand::Yield)
    }

    /// Leave the game.
    pub fn withdraw(&self) -> Result<(), UnigameError> {
        self.send(ClientCommand::Withdraw)
    }

    /// Send a chat line.
    pub fn send_chat(&self, text: impl Into<String>) -> Result<(), UnigameError> {
        self.send(ClientCommand::SendChat(text.into()))
    }

    /// Set a player's score.
    pub fn set_score(&self, index: usize, score: i32) -> Result<(), UnigameError> {
        self.send(ClientCommand::SetScore { index, score })
    }

    /// Turn scoring on or off.
    pub fn set_scoring(&self, scoring: Scoring) -> Result<(), UnigameError> {
        self.send(ClientCommand::SetScoring(scoring))
    }

    /// Run `change` against the game handler on the session task.
    pub fn with_game(&self, change: impl FnOnce(&mut H) + Send + 'static) -> Result<(), UnigameError> {
        self.send(ClientCommand::WithGame(Box::new(change)))
    }

    /// Dismiss the pending notice.
    pub fn acknowledge_notice(&self) -> Result<(), UnigameError> {
        self.send(ClientCommand::AcknowledgeNotice)
    }

    /// Clear the unread chat flag.
    pub fn mark_chat_read(&self) -> Result<(), UnigameError> {
        self.send(ClientCommand::MarkChatRead)
    }

    /// Stop the session task, shutting down any transport.
    pub async fn shutdown(mut self) -> Result<(), UnigameError> {
        let _ = self.commands.send(ClientCommand::Shutdown);
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| UnigameError::SessionClosed)?;
        }
        Ok(())
    }
}

impl<H: GameHandler> Drop for UnigameClient<H> {
    fn drop(&mut self) {
        let _ = self.commands.send(ClientCommand::Shutdown);
    }
}
