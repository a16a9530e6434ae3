//! Sync engine
//!
//! The authoritative state machine of a game session. It folds transport
//! events into the roster, turn and withdrawal state, and turns local player
//! actions into records for the transport.
//!
//! The engine is single-threaded: every mutation happens through `&mut self`.
//! The session driver in [`crate::client`] owns it and serializes events and
//! local commands onto it.

use crate::config::Settings;
use crate::core::{
    ConfigError, GameHandler, MAX_PLAYERS, Player, RosterError, Scoring, SyncError,
};
use crate::transport::{Transport, TransportConfig, TransportError, TransportEvent};

use super::message::GameState;
use super::roster::{Roster, RosterStatus};

/// Coarse phase of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The roster is not complete yet.
    Gathering,
    /// The leader is configuring the game and has not yielded yet.
    Setup,
    /// Turns are being taken.
    Playing,
}

/// What a notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Roster validation failed.
    Roster,
    /// The transport failed or could not be built.
    Transport,
    /// Contact with a player was lost.
    LostPlayer,
    /// A player withdrew.
    Withdrawal,
    /// The game handler rejected remote state.
    Game,
    /// A peer violated the protocol.
    Protocol,
}

/// A user-facing condition.
///
/// Acknowledging a terminal notice ends the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Text for the user.
    pub message: String,
    /// Whether acknowledging this notice starts a fresh game.
    pub terminal: bool,
    /// Category.
    pub kind: NoticeKind,
}

impl Notice {
    fn terminal(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            terminal: true,
            kind,
        }
    }

    fn transient(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            terminal: false,
            kind,
        }
    }
}

/// Result of handling a transport event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Local state changed.
    Applied,
    /// The event had no effect.
    Ignored,
    /// A notice was posted.
    Noticed,
    /// The game was reset to a fresh one.
    Reset,
}

/// Synchronization engine for one device.
pub struct SyncEngine<H: GameHandler> {
    settings: Settings,
    handler: H,
    roster: Roster,
    leader: bool,
    num_players: usize,
    active_player: usize,
    play_begun: bool,
    setup_complete: bool,
    draining: bool,
    solitaire: bool,
    scoring: Scoring,
    chat: Option<Vec<String>>,
    chat_unread: bool,
    notice: Option<Notice>,
    transport: Option<Box<dyn Transport>>,
}

impl<H: GameHandler> SyncEngine<H> {
    /// Create an engine in the fresh-game state.
    pub fn new(handler: H, settings: Settings) -> Self {
        let local = Player::new(settings.user_name.clone(), settings.lead_player);
        let mut engine = Self {
            settings,
            handler,
            roster: Roster::new(local),
            leader: false,
            num_players: 0,
            active_player: 0,
            play_begun: false,
            setup_complete: false,
            draining: false,
            solitaire: false,
            scoring: Scoring::Off,
            chat: None,
            chat_unread: false,
            notice: None,
            transport: None,
        };
        engine.reset(false);
        engine
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Settings in effect for the current game.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The game handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable access to the game handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The current roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Index of the local player in the roster.
    pub fn local_index(&self) -> usize {
        self.roster.local_index()
    }

    /// Index of the player whose turn it is.
    pub fn active_player(&self) -> usize {
        self.active_player
    }

    /// Working player count (0 = not known yet).
    pub fn num_players(&self) -> usize {
        self.num_players
    }

    /// Whether the local player leads this game.
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        if !self.play_begun {
            Phase::Gathering
        } else if self.is_leader() && self.handler.has_setup() && !self.setup_complete {
            Phase::Setup
        } else {
            Phase::Playing
        }
    }

    /// Whether the roster is complete and turns may be taken.
    pub fn play_begun(&self) -> bool {
        self.play_begun
    }

    /// Whether the game is being torn down after a withdrawal.
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Whether this is a solitaire game.
    pub fn is_solitaire(&self) -> bool {
        self.solitaire
    }

    /// Whether the local player may transmit now.
    pub fn is_my_turn(&self) -> bool {
        self.play_begun && !self.draining && self.local_index() == self.active_player
    }

    /// Scoring mode.
    pub fn scoring(&self) -> Scoring {
        self.scoring
    }

    /// The pending notice, if any.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Chat lines of this game, or `None` before the first one.
    pub fn chat_transcript(&self) -> Option<&[String]> {
        self.chat.as_deref()
    }

    /// Whether chat lines arrived since [`Self::mark_chat_read`].
    pub fn chat_unread(&self) -> bool {
        self.chat_unread
    }

    /// Clear the unread chat flag.
    pub fn mark_chat_read(&mut self) {
        self.chat_unread = false;
    }

    /// Whether chat is possible.
    pub fn chat_enabled(&self) -> bool {
        self.transport.is_some() && self.num_players > 1
    }

    /// Whether a transport is attached.
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    // =========================================================================
    // Game lifecycle
    // =========================================================================

    /// Replace the settings. They take effect at the next fresh game.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Abandon the current game and start a fresh one.
    pub fn new_game(&mut self) {
        self.reset(false);
    }

    fn reset(&mut self, due_to_error: bool) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown(due_to_error);
        }
        let local = Player::new(self.settings.user_name.clone(), self.settings.lead_player);
        self.roster = Roster::new(local);
        self.leader = self.settings.lead_player;
        self.num_players = self.initial_num_players();
        self.active_player = 0;
        self.play_begun = false;
        self.setup_complete = false;
        self.draining = false;
        self.solitaire = false;
        self.scoring = self.handler.initial_scoring();
        self.chat = None;
        self.chat_unread = false;
        self.handler.reset();
        tracing::debug!(num_players = self.num_players, "fresh game");
    }

    fn initial_num_players(&self) -> usize {
        if !self.settings.lead_player {
            return 0;
        }
        let range = self.handler.num_player_range();
        let lo = (*range.start()).max(1);
        let hi = (*range.end()).clamp(lo, MAX_PLAYERS);
        self.settings.num_players.max(1).clamp(lo, hi)
    }

    /// Input for building this game's transport.
    ///
    /// The access token is left unset; the caller supplies it.
    pub fn transport_config(&self) -> Result<TransportConfig, ConfigError> {
        let group_token = self
            .settings
            .group_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::Invalid("no group token".into()))?;
        let mut builder = TransportConfig::builder()
            .proximity_only(self.settings.proximity_only)
            .local_player(self.roster.local().clone())
            .num_players(self.num_players)
            .group_token(group_token)
            .app_id(self.handler.app_id());
        if let Some(endpoint) = &self.settings.relay_endpoint {
            builder = builder.relay_endpoint(endpoint.clone());
        }
        Ok(builder.build())
    }

    /// Attach the transport for this game, replacing any previous one.
    pub fn attach_transport(&mut self, transport: Box<dyn Transport>) {
        if let Some(previous) = self.transport.replace(transport) {
            previous.shutdown(false);
        }
    }

    /// Report that the transport could not be built.
    pub fn connection_failed(&mut self, error: &TransportError) {
        tracing::warn!(%error, "could not establish communication");
        self.post(Notice::terminal(
            NoticeKind::Transport,
            format!("Could not establish communication: {error}"),
        ));
    }

    /// Begin a one-player game without a transport.
    ///
    /// Only a leader whose player count is 1 can play solitaire.
    pub fn start_solitaire(&mut self) -> bool {
        if !self.is_leader() || self.num_players != 1 || self.play_begun {
            return false;
        }
        self.roster.complete_solitaire();
        self.solitaire = true;
        self.play_begun = true;
        tracing::info!("solitaire play begun");
        true
    }

    // =========================================================================
    // Local actions
    // =========================================================================

    /// Transmit the current game state without giving up the turn.
    pub fn transmit_move(&mut self) -> bool {
        if !self.is_my_turn() {
            return false;
        }
        let during_setup = self.phase() == Phase::Setup;
        let info = self.handler.encode_state(during_setup);
        self.transmit(self.active_player, info);
        true
    }

    /// Transmit the leader's setup.
    pub fn transmit_setup(&mut self) -> bool {
        if !self.is_my_turn() || self.phase() != Phase::Setup {
            return false;
        }
        let info = self.handler.encode_state(true);
        self.transmit(self.active_player, info);
        true
    }

    /// Transmit the current game state and pass the turn on.
    pub fn yield_turn(&mut self) -> bool {
        if !self.is_my_turn() {
            return false;
        }
        let next = (self.local_index() + 1) % self.roster.len();
        let info = self.handler.encode_state(false);
        self.transmit(next, info);
        self.active_player = next;
        if self.is_leader() {
            self.setup_complete = true;
        }
        true
    }

    fn transmit(&self, active_player: usize, info: Vec<u8>) {
        let Some(transport) = &self.transport else {
            return;
        };
        // Complete rosters never exceed MAX_PLAYERS, so indices fit in a byte.
        let state = GameState::new(self.local_index() as u8, active_player as u8, info)
            .with_scores(self.wire_scores());
        transport.send(&state);
    }

    fn wire_scores(&self) -> Vec<i32> {
        match self.scoring {
            Scoring::On => self.roster.scores(),
            Scoring::Off => Vec::new(),
        }
    }

    /// Change the scoring mode.
    pub fn set_scoring(&mut self, scoring: Scoring) {
        self.scoring = scoring;
    }

    /// Set a player's score. Ignored when scoring is off.
    pub fn set_score(&mut self, index: usize, score: i32) {
        if self.scoring == Scoring::On {
            self.roster.set_score(index, score);
        }
    }

    /// Leave the game.
    ///
    /// Before play begins this abandons the game outright. Once play has
    /// begun the other players are told and the game drains.
    pub fn withdraw(&mut self) {
        if self.solitaire || !self.play_begun {
            self.reset(false);
            return;
        }
        if self.draining {
            tracing::debug!("already draining; withdrawal not repeated");
            return;
        }
        tracing::info!("withdrawing from game");
        self.draining = true;
        self.roster.mark_withdrawn(self.local_index());
        self.send_withdrawal();
    }

    fn send_withdrawal(&self) {
        if let Some(transport) = &self.transport {
            transport.send(&GameState::withdrawal(
                self.local_index() as u8,
                self.wire_scores(),
            ));
        }
    }

    /// Send a chat line, prefixed with the user's name.
    pub fn send_chat(&self, text: &str) {
        if let Some(transport) = &self.transport {
            transport.send_chat(&format!("[{}] {}", self.settings.user_name, text));
        }
    }

    /// Dismiss the pending notice. A terminal notice ends the game.
    pub fn acknowledge_notice(&mut self) {
        if let Some(notice) = self.notice.take() {
            if notice.terminal {
                self.reset(true);
            }
        }
    }

    fn post(&mut self, notice: Notice) {
        if self.notice.as_ref().is_some_and(|n| n.terminal) {
            tracing::debug!(message = %notice.message, "terminal notice pending; dropping notice");
            return;
        }
        self.notice = Some(notice);
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    /// Fold one transport event into the engine.
    ///
    /// Errors are also posted as notices.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<EventOutcome, SyncError> {
        match event {
            TransportEvent::RosterObserved { declared, players } => {
                self.on_roster(declared, players)
            }
            TransportEvent::StateChanged(state) => self.on_state(state),
            TransportEvent::PlayerLost(player) => Ok(self.on_player_lost(&player)),
            TransportEvent::ChatReceived(text) => {
                self.chat.get_or_insert_with(Vec::new).push(text);
                self.chat_unread = true;
                Ok(EventOutcome::Applied)
            }
            TransportEvent::Error { error, fatal } => Ok(self.on_error(&error, fatal)),
        }
    }

    fn on_roster(
        &mut self,
        declared: usize,
        players: Vec<Player>,
    ) -> Result<EventOutcome, SyncError> {
        tracing::debug!(declared, present = players.len(), "roster observed");
        if self.play_begun {
            tracing::debug!("play already begun; ignoring roster");
            return Ok(EventOutcome::Ignored);
        }
        if !self.is_leader() {
            self.num_players = declared;
        }
        if self.num_players > MAX_PLAYERS {
            return Err(self.roster_failure(RosterError::TooManyPlayers.into()));
        }

        match self
            .roster
            .replace(players, &self.settings.user_name, self.num_players)
        {
            Ok(RosterStatus::Complete) => {
                self.play_begun = true;
                tracing::info!(players = self.roster.len(), "player list complete, play begun");
                Ok(EventOutcome::Applied)
            }
            Ok(status) => {
                tracing::debug!(?status, "player list not complete");
                Ok(EventOutcome::Applied)
            }
            Err(err) => Err(self.roster_failure(err)),
        }
    }

    fn roster_failure(&mut self, err: SyncError) -> SyncError {
        let notice = match &err {
            SyncError::Roster(roster) => Notice::terminal(NoticeKind::Roster, roster.to_string()),
            other => Notice::terminal(NoticeKind::Protocol, other.to_string()),
        };
        tracing::warn!(%err, "roster rejected");
        self.post(notice);
        err
    }

    fn on_state(&mut self, state: GameState) -> Result<EventOutcome, SyncError> {
        if usize::from(state.sending_player) == self.local_index() {
            tracing::debug!("rejected incoming game state that originated with this player");
            return Ok(EventOutcome::Ignored);
        }
        if !self.play_begun {
            tracing::debug!("play has not begun; not processing game state");
            return Ok(EventOutcome::Ignored);
        }
        if state.is_withdrawal() {
            return Ok(self.on_withdrawal(usize::from(state.sending_player)));
        }
        if self.draining {
            tracing::debug!("draining; ignoring game state");
            return Ok(EventOutcome::Ignored);
        }

        let active = usize::from(state.active_player);
        if active >= self.roster.len() {
            let err = SyncError::ActivePlayerOutOfRange {
                active,
                len: self.roster.len(),
            };
            tracing::error!(%err, "protocol violation");
            self.post(Notice::terminal(NoticeKind::Protocol, err.to_string()));
            return Err(err);
        }

        if !self.is_leader() && active != 0 {
            self.setup_complete = true;
        }
        let during_setup = self.handler.has_setup() && !self.is_leader() && !self.setup_complete;
        if let Err(err) = self.handler.state_changed(&state.game_info, during_setup) {
            tracing::warn!(%err, "game rejected remote state");
            self.post(Notice::transient(NoticeKind::Game, err.to_string()));
            return Ok(EventOutcome::Noticed);
        }

        self.active_player = active;
        if !state.scores.is_empty() {
            self.roster.apply_scores(&state.scores);
        }
        Ok(EventOutcome::Applied)
    }

    fn on_withdrawal(&mut self, sender: usize) -> EventOutcome {
        if !self.roster.mark_withdrawn(sender) {
            tracing::warn!(sender, "withdrawal from unknown player");
            return EventOutcome::Ignored;
        }
        let name = self
            .roster
            .get(sender)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        tracing::info!(player = %name, "player withdrew");

        let mut outcome = EventOutcome::Applied;
        if !self.draining {
            self.draining = true;
            self.roster.mark_withdrawn(self.local_index());
            self.send_withdrawal();
            self.post(Notice::terminal(
                NoticeKind::Withdrawal,
                format!("'{name}' has left the game"),
            ));
            outcome = EventOutcome::Noticed;
        }

        if self.roster.all_others_withdrawn() {
            tracing::info!("every player has withdrawn; starting a fresh game");
            self.reset(false);
            outcome = EventOutcome::Reset;
        }
        outcome
    }

    fn on_player_lost(&mut self, player: &Player) -> EventOutcome {
        if self.draining && self.roster.is_withdrawn(&player.name) {
            tracing::debug!(player = %player.name, "withdrawn player disconnected");
            return EventOutcome::Ignored;
        }
        tracing::warn!(player = %player.name, "lost player");
        self.post(Notice::terminal(
            NoticeKind::LostPlayer,
            format!("Lost contact with '{}'", player.name),
        ));
        EventOutcome::Noticed
    }

    fn on_error(&mut self, error: &TransportError, fatal: bool) -> EventOutcome {
        if self.draining {
            tracing::debug!(%error, "draining; transport error suppressed");
            return EventOutcome::Ignored;
        }
        let kind = if error.is_protocol_violation() {
            tracing::error!(%error, "peer broke the wire protocol");
            NoticeKind::Protocol
        } else {
            NoticeKind::Transport
        };
        let notice = if fatal {
            Notice::terminal(kind, error.to_string())
        } else {
            Notice::transient(kind, error.to_string())
        };
        self.post(notice);
        EventOutcome::Noticed
    }
}

impl<H: GameHandler> Drop for SyncEngine<H> {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown(false);
        }
    }
}

impl<H: GameHandler + std::fmt::Debug> std::fmt::Debug for SyncEngine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("handler", &self.handler)
            .field("roster", &self.roster)
            .field("active_player", &self.active_player)
            .field("phase", &self.phase())
            .field("draining", &self.draining)
            .field("notice", &self.notice)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::ops::RangeInclusive;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::core::{GameError, WireError};

    #[derive(Debug, Default)]
    struct TestGame {
        setup: bool,
        scoring: bool,
        payload: Vec<u8>,
        received: Vec<(Vec<u8>, bool)>,
        reject: bool,
        resets: usize,
    }

    impl GameHandler for TestGame {
        fn reset(&mut self) {
            self.resets += 1;
        }

        fn state_changed(&mut self, data: &[u8], during_setup: bool) -> Result<(), GameError> {
            if self.reject {
                return Err(GameError::new("illegal move"));
            }
            self.received.push((data.to_vec(), during_setup));
            Ok(())
        }

        fn encode_state(&self, during_setup: bool) -> Vec<u8> {
            let mut out = self.payload.clone();
            out.push(u8::from(during_setup));
            out
        }

        fn num_player_range(&self) -> RangeInclusive<usize> {
            1..=4
        }

        fn app_id(&self) -> &str {
            "test"
        }

        fn has_setup(&self) -> bool {
            self.setup
        }

        fn initial_scoring(&self) -> Scoring {
            if self.scoring { Scoring::On } else { Scoring::Off }
        }
    }

    #[derive(Clone, Default)]
    struct Wire {
        sent: Arc<Mutex<Vec<GameState>>>,
        chats: Arc<Mutex<Vec<String>>>,
        shutdowns: Arc<Mutex<Vec<bool>>>,
    }

    impl Wire {
        fn sent(&self) -> Vec<GameState> {
            self.sent.lock().unwrap().clone()
        }

        fn last(&self) -> GameState {
            self.sent().last().cloned().expect("nothing sent")
        }
    }

    impl Transport for Wire {
        fn send(&self, state: &GameState) {
            self.sent.lock().unwrap().push(state.clone());
        }

        fn send_chat(&self, text: &str) {
            self.chats.lock().unwrap().push(text.to_string());
        }

        fn shutdown(&self, due_to_error: bool) {
            self.shutdowns.lock().unwrap().push(due_to_error);
        }
    }

    fn settings(name: &str, leader: bool, num_players: usize) -> Settings {
        Settings {
            user_name: name.into(),
            lead_player: leader,
            num_players,
            group_token: Some("grp".into()),
            ..Settings::default()
        }
    }

    fn joined(
        name: &str,
        leader: bool,
        num_players: usize,
        game: TestGame,
    ) -> (SyncEngine<TestGame>, Wire) {
        let mut engine = SyncEngine::new(game, settings(name, leader, num_players));
        let wire = Wire::default();
        engine.attach_transport(Box::new(wire.clone()));
        (engine, wire)
    }

    fn roster(names: &[&str]) -> Vec<Player> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Player::with_order(*n, if i == 0 { 1 } else { 10 + i as u32 }))
            .collect()
    }

    fn converge(engine: &mut SyncEngine<TestGame>, names: &[&str]) {
        let outcome = engine.handle_event(TransportEvent::RosterObserved {
            declared: names.len(),
            players: roster(names),
        });
        assert_eq!(outcome, Ok(EventOutcome::Applied));
        assert!(engine.play_begun());
    }

    fn state(event: GameState) -> TransportEvent {
        TransportEvent::StateChanged(event)
    }

    fn assert_fresh(engine: &SyncEngine<TestGame>) {
        assert_eq!(engine.phase(), Phase::Gathering);
        assert_eq!(engine.roster().len(), 1);
        assert!(!engine.roster().local().withdrawn);
        assert!(!engine.is_draining());
        assert_eq!(engine.local_index(), 0);
    }

    #[test]
    fn test_fresh_game() {
        let engine = SyncEngine::new(TestGame::default(), settings("Ada", true, 0));
        assert_eq!(engine.phase(), Phase::Gathering);
        assert_eq!(engine.roster().len(), 1);
        assert_eq!(engine.roster().local().order, 1);
        assert_eq!(engine.num_players(), 1);
        assert!(!engine.is_my_turn());

        let member = SyncEngine::new(TestGame::default(), settings("Bob", false, 3));
        assert_eq!(member.num_players(), 0);
        assert!(member.roster().local().order > 1);
    }

    #[test]
    fn test_transport_config() {
        let engine = SyncEngine::new(TestGame::default(), settings("Ada", true, 9));
        let config = engine.transport_config().unwrap();
        assert_eq!(config.num_players, 4);
        assert_eq!(config.group_token, "grp");
        assert_eq!(config.app_id, "test");
        assert_eq!(config.local_player.token(), "1:Ada");

        let mut no_token = settings("Ada", true, 2);
        no_token.group_token = None;
        let engine = SyncEngine::new(TestGame::default(), no_token);
        assert!(engine.transport_config().is_err());
    }

    #[test]
    fn test_roster_grows_until_complete() {
        let (mut engine, _wire) = joined("Bob", false, 0, TestGame::default());
        let players = roster(&["Ada", "Bob", "Cy"]);

        engine
            .handle_event(TransportEvent::RosterObserved {
                declared: 0,
                players: players[..2].to_vec(),
            })
            .unwrap();
        assert_eq!(engine.phase(), Phase::Gathering);

        engine
            .handle_event(TransportEvent::RosterObserved {
                declared: 3,
                players: players[..2].to_vec(),
            })
            .unwrap();
        assert_eq!(engine.num_players(), 3);
        assert_eq!(engine.phase(), Phase::Gathering);

        engine
            .handle_event(TransportEvent::RosterObserved {
                declared: 3,
                players,
            })
            .unwrap();
        assert_eq!(engine.phase(), Phase::Playing);
        assert_eq!(engine.local_index(), 1);
    }

    #[test]
    fn test_out_of_order_roster_rejected() {
        let (mut engine, _wire) = joined("Ada", false, 0, TestGame::default());
        let players = vec![Player::with_order("Bob", 2), Player::with_order("Ada", 1)];
        let result = engine.handle_event(TransportEvent::RosterObserved {
            declared: 2,
            players,
        });
        assert_eq!(result, Err(SyncError::Roster(RosterError::NoLeadPlayer)));
        let notice = engine.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::Roster);
        assert_eq!(notice.message, "No Lead Player");
        assert!(notice.terminal);
        assert!(!engine.play_begun());
    }

    #[test]
    fn test_roster_without_self() {
        let (mut engine, _wire) = joined("Zed", false, 0, TestGame::default());
        let result = engine.handle_event(TransportEvent::RosterObserved {
            declared: 2,
            players: roster(&["Ada", "Bob"]),
        });
        assert!(matches!(result, Err(SyncError::SelfNotInRoster(_))));
        assert_eq!(engine.notice().unwrap().kind, NoticeKind::Protocol);
    }

    #[test]
    fn test_too_many_players_and_leaders() {
        let (mut engine, _wire) = joined("Ada", true, 2, TestGame::default());
        let result = engine.handle_event(TransportEvent::RosterObserved {
            declared: 2,
            players: roster(&["Ada", "Bob", "Cy"]),
        });
        assert_eq!(result, Err(SyncError::Roster(RosterError::TooManyPlayers)));
        assert_eq!(engine.notice().unwrap().message, "Too Many Players");

        let (mut engine, _wire) = joined("Ada", true, 2, TestGame::default());
        let result = engine.handle_event(TransportEvent::RosterObserved {
            declared: 2,
            players: vec![Player::with_order("Ada", 1), Player::with_order("Bob", 1)],
        });
        assert_eq!(result, Err(SyncError::Roster(RosterError::TooManyLeaders)));
    }

    #[test]
    fn test_yield_passes_turn() {
        let (mut ada, ada_wire) = joined("Ada", true, 2, TestGame::default());
        let (mut bob, bob_wire) = joined("Bob", false, 0, TestGame::default());
        converge(&mut ada, &["Ada", "Bob"]);
        converge(&mut bob, &["Ada", "Bob"]);

        assert!(ada.is_my_turn());
        assert!(!bob.is_my_turn());
        assert!(!bob.yield_turn());
        assert!(!bob.transmit_move());
        assert!(!bob.transmit_setup());
        assert!(bob_wire.sent().is_empty());

        assert!(ada.yield_turn());
        let record = ada_wire.last();
        assert_eq!(record.sending_player, 0);
        assert_eq!(record.active_player, 1);
        assert_eq!(ada.active_player(), 1);

        assert_eq!(bob.handle_event(state(record)), Ok(EventOutcome::Applied));
        assert_eq!(bob.active_player(), 1);
        assert!(bob.is_my_turn());
    }

    #[test]
    fn test_move_keeps_turn() {
        let (mut ada, wire) = joined("Ada", true, 2, TestGame::default());
        converge(&mut ada, &["Ada", "Bob"]);
        assert!(ada.transmit_move());
        assert_eq!(wire.last().active_player, 0);
        assert!(ada.is_my_turn());
    }

    #[test]
    fn test_self_echo_and_early_state_ignored() {
        let (mut bob, _wire) = joined("Bob", false, 0, TestGame::default());
        let early = GameState::new(0, 1, vec![1]);
        assert_eq!(bob.handle_event(state(early)), Ok(EventOutcome::Ignored));

        converge(&mut bob, &["Ada", "Bob"]);
        let echo = GameState::new(1, 0, vec![1]);
        assert_eq!(bob.handle_event(state(echo)), Ok(EventOutcome::Ignored));
        assert!(bob.handler().received.is_empty());
    }

    #[test]
    fn test_active_player_out_of_range() {
        let (mut bob, _wire) = joined("Bob", false, 0, TestGame::default());
        converge(&mut bob, &["Ada", "Bob"]);
        let result = bob.handle_event(state(GameState::new(0, 7, vec![])));
        assert_eq!(
            result,
            Err(SyncError::ActivePlayerOutOfRange { active: 7, len: 2 })
        );
        let notice = bob.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::Protocol);
        assert!(notice.terminal);
    }

    #[test]
    fn test_handler_rejection_is_transient() {
        let game = TestGame {
            reject: true,
            ..TestGame::default()
        };
        let (mut bob, _wire) = joined("Bob", false, 0, game);
        converge(&mut bob, &["Ada", "Bob"]);

        let outcome = bob.handle_event(state(GameState::new(0, 1, vec![9])));
        assert_eq!(outcome, Ok(EventOutcome::Noticed));
        assert_eq!(bob.active_player(), 0);
        let notice = bob.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::Game);
        assert!(!notice.terminal);

        bob.acknowledge_notice();
        assert!(bob.play_begun());
    }

    #[test]
    fn test_setup_phase() {
        let game = || TestGame {
            setup: true,
            ..TestGame::default()
        };
        let (mut ada, ada_wire) = joined("Ada", true, 2, game());
        let (mut bob, _bob_wire) = joined("Bob", false, 0, game());
        converge(&mut ada, &["Ada", "Bob"]);
        converge(&mut bob, &["Ada", "Bob"]);

        assert_eq!(ada.phase(), Phase::Setup);
        assert_eq!(bob.phase(), Phase::Playing);

        assert!(ada.transmit_setup());
        let setup = ada_wire.last();
        assert_eq!(setup.game_info, vec![1]);
        bob.handle_event(state(setup)).unwrap();

        assert!(ada.yield_turn());
        assert_eq!(ada.phase(), Phase::Playing);
        assert!(!ada.transmit_setup());
        bob.handle_event(state(ada_wire.last())).unwrap();

        assert_eq!(
            bob.handler().received,
            vec![(vec![1], true), (vec![0], false)]
        );
    }

    #[test]
    fn test_scores_carried() {
        let game = || TestGame {
            scoring: true,
            ..TestGame::default()
        };
        let (mut ada, ada_wire) = joined("Ada", true, 2, game());
        let (mut bob, _wire) = joined("Bob", false, 0, game());
        converge(&mut ada, &["Ada", "Bob"]);
        converge(&mut bob, &["Ada", "Bob"]);

        ada.set_score(0, 12);
        ada.yield_turn();
        assert_eq!(ada_wire.last().scores, vec![12, 0]);

        let remote = GameState::new(0, 1, vec![]).with_scores(vec![3, 4, 99]);
        bob.handle_event(state(remote)).unwrap();
        assert_eq!(bob.roster().scores(), vec![3, 4]);
    }

    #[test]
    fn test_scores_off() {
        let (mut ada, wire) = joined("Ada", true, 2, TestGame::default());
        converge(&mut ada, &["Ada", "Bob"]);
        ada.set_score(0, 12);
        assert_eq!(ada.roster().scores(), vec![0, 0]);
        ada.yield_turn();
        assert!(wire.last().scores.is_empty());
    }

    #[test]
    fn test_peer_withdrawal_converges() {
        let (mut ada, wire) = joined("Ada", true, 2, TestGame::default());
        converge(&mut ada, &["Ada", "Bob"]);

        let outcome = ada.handle_event(state(GameState::withdrawal(1, vec![])));
        assert_eq!(outcome, Ok(EventOutcome::Reset));

        let echo = wire.last();
        assert!(echo.is_withdrawal());
        assert_eq!(echo.sending_player, 0);

        let notice = ada.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::Withdrawal);
        assert_eq!(notice.message, "'Bob' has left the game");
        assert_fresh(&ada);
        assert!(!ada.has_transport());
        assert_eq!(*wire.shutdowns.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_withdraw_while_draining() {
        let (mut ada, wire) = joined("Ada", true, 3, TestGame::default());
        converge(&mut ada, &["Ada", "Bob", "Cy"]);

        ada.handle_event(state(GameState::withdrawal(1, vec![])))
            .unwrap();
        assert!(ada.is_draining());
        assert_eq!(wire.sent().len(), 1);
        let notice = ada.notice().cloned();

        ada.withdraw();
        assert_eq!(wire.sent().len(), 1);
        assert_eq!(ada.notice().cloned(), notice);
        assert!(!ada.yield_turn());

        let outcome = ada.handle_event(state(GameState::withdrawal(2, vec![])));
        assert_eq!(outcome, Ok(EventOutcome::Reset));
        assert_eq!(wire.sent().len(), 1);
    }

    #[test]
    fn test_local_withdrawal_round_trip() {
        let (mut ada, ada_wire) = joined("Ada", true, 2, TestGame::default());
        let (mut bob, bob_wire) = joined("Bob", false, 0, TestGame::default());
        converge(&mut ada, &["Ada", "Bob"]);
        converge(&mut bob, &["Ada", "Bob"]);

        ada.withdraw();
        assert!(ada.is_draining());
        let record = ada_wire.last();
        assert!(record.is_withdrawal());

        assert_eq!(bob.handle_event(state(record)), Ok(EventOutcome::Reset));
        let echo = bob_wire.last();
        assert_eq!(ada.handle_event(state(echo)), Ok(EventOutcome::Reset));
        assert_fresh(&ada);
        assert_fresh(&bob);
        assert!(ada.notice().is_none());
    }

    #[test]
    fn test_withdraw_before_play() {
        let (mut ada, wire) = joined("Ada", true, 2, TestGame::default());
        ada.withdraw();
        assert!(wire.sent().is_empty());
        assert_eq!(*wire.shutdowns.lock().unwrap(), vec![false]);
        assert!(!ada.has_transport());
    }

    #[test]
    fn test_lost_player() {
        let (mut ada, _wire) = joined("Ada", true, 3, TestGame::default());
        converge(&mut ada, &["Ada", "Bob", "Cy"]);
        ada.handle_event(state(GameState::withdrawal(1, vec![])))
            .unwrap();
        let bob = Player::with_order("Bob", 11);
        assert_eq!(
            ada.handle_event(TransportEvent::PlayerLost(bob)),
            Ok(EventOutcome::Ignored)
        );

        let (mut ada, _wire) = joined("Ada", true, 2, TestGame::default());
        converge(&mut ada, &["Ada", "Bob"]);
        let bob = Player::with_order("Bob", 11);
        ada.handle_event(TransportEvent::PlayerLost(bob)).unwrap();
        let notice = ada.notice().unwrap();
        assert_eq!(notice.message, "Lost contact with 'Bob'");
        assert!(notice.terminal);
    }

    #[test]
    fn test_transport_errors() {
        let (mut ada, wire) = joined("Ada", true, 2, TestGame::default());
        ada.handle_event(TransportEvent::Error {
            error: TransportError::Discovery("radio off".into()),
            fatal: false,
        })
        .unwrap();
        assert!(!ada.notice().unwrap().terminal);
        ada.acknowledge_notice();
        assert!(ada.has_transport());

        ada.handle_event(TransportEvent::Error {
            error: TransportError::NotConnected,
            fatal: true,
        })
        .unwrap();
        assert!(ada.notice().unwrap().terminal);
        ada.acknowledge_notice();
        assert!(!ada.has_transport());
        assert_eq!(*wire.shutdowns.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_wire_error_is_protocol_notice() {
        let (mut ada, _wire) = joined("Ada", true, 2, TestGame::default());
        converge(&mut ada, &["Ada", "Bob"]);

        ada.handle_event(TransportEvent::Error {
            error: TransportError::Wire(WireError::TooShort {
                expected: 3,
                actual: 1,
            }),
            fatal: true,
        })
        .unwrap();
        let notice = ada.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::Protocol);
        assert!(notice.terminal);
    }

    #[test]
    fn test_errors_suppressed_while_draining() {
        let (mut ada, _wire) = joined("Ada", true, 2, TestGame::default());
        converge(&mut ada, &["Ada", "Bob"]);
        ada.withdraw();
        let outcome = ada.handle_event(TransportEvent::Error {
            error: TransportError::Receive("reset".into()),
            fatal: true,
        });
        assert_eq!(outcome, Ok(EventOutcome::Ignored));
        assert!(ada.notice().is_none());
    }

    #[test]
    fn test_chat() {
        let (mut ada, wire) = joined("Ada", true, 2, TestGame::default());
        assert!(ada.chat_enabled());
        assert!(ada.chat_transcript().is_none());

        ada.send_chat("hello");
        assert_eq!(*wire.chats.lock().unwrap(), vec!["[Ada] hello".to_string()]);

        ada.handle_event(TransportEvent::ChatReceived("[Bob] hi".into()))
            .unwrap();
        assert_eq!(ada.chat_transcript().unwrap(), ["[Bob] hi".to_string()]);
        assert!(ada.chat_unread());
        ada.mark_chat_read();
        assert!(!ada.chat_unread());

        let resets = ada.handler().resets;
        ada.new_game();
        assert!(ada.chat_transcript().is_none());
        assert_eq!(ada.handler().resets, resets + 1);
    }

    #[test]
    fn test_solitaire() {
        let mut engine = SyncEngine::new(TestGame::default(), settings("Ada", true, 1));
        assert!(engine.start_solitaire());
        assert_eq!(engine.phase(), Phase::Playing);
        assert!(engine.yield_turn());
        assert_eq!(engine.active_player(), 0);

        engine.withdraw();
        assert!(!engine.play_begun());

        let mut member = SyncEngine::new(TestGame::default(), settings("Bob", false, 1));
        assert!(!member.start_solitaire());
    }

    #[test]
    fn test_connection_failed() {
        let mut engine = SyncEngine::new(TestGame::default(), settings("Ada", false, 0));
        engine.connection_failed(&TransportError::MissingAccessToken);
        let notice = engine.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::Transport);
        assert!(notice.terminal);
        assert!(notice.message.starts_with("Could not establish communication"));
    }
}
