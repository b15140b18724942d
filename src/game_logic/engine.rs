//! Turn state machine for a single room.
//!
//! Every function here is a pure mutation of a [`Room`] value. Callers load the
//! room, apply one action and persist the result only when the action reports
//! an [`Effect`]; an [`Ignored`] result means the room was not touched.

use serde::{Deserialize, Serialize};

use super::cards::{Card, Hand, Pile, Row, build_double_deck, score_hand, shuffle};
use super::membership;
use super::room::{GameState, PlayerId, Room};
use super::{ActionResult, Effect, Ignored};

pub const MIN_PLAYERS_TO_START: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    StartGame,
    PeekDone,
    ReplaceCard,
    DiscardDrawnCard,
    CallStop,
    NewGame,
}

/// Which phase a finished game returns to when the admin asks for a new one.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NewGamePolicy {
    /// Re-deal and wait for the admin to start again, letting players join in between.
    #[default]
    WaitForStart,
    /// Re-deal and go straight to peeking.
    DealAndPeek,
}

/// Phase transition table. Membership changes are legal in every phase and are
/// not listed here.
pub fn admits(state: GameState, action: ActionKind) -> bool {
    use ActionKind as A;
    use GameState as S;

    matches!(
        (state, action),
        (S::WaitingForPlayers, A::StartGame)
            | (S::Peeking, A::PeekDone)
            | (S::Playing, A::ReplaceCard | A::DiscardDrawnCard | A::CallStop)
            | (S::FinalRound, A::ReplaceCard | A::DiscardDrawnCard)
            | (S::GameOver, A::NewGame)
    )
}

pub(super) fn ensure_admitted(room: &Room, action: ActionKind) -> Result<(), Ignored> {
    if admits(room.game_state, action) {
        Ok(())
    } else {
        Err(Ignored::WrongPhase {
            action,
            state: room.game_state,
        })
    }
}

fn ensure_turn(room: &Room, player_id: PlayerId, action: ActionKind) -> Result<(), Ignored> {
    ensure_admitted(room, action)?;
    if room.player(player_id).is_none() {
        return Err(Ignored::UnknownPlayer);
    }
    if !room.is_turn_of(player_id) {
        return Err(Ignored::NotYourTurn);
    }
    Ok(())
}

/// Everything a seated player can ask of the room once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCommand {
    ReplaceCard { row: Row, index: usize, pile: Pile },
    DiscardDrawnCard,
    CallStop,
    PeekDone,
    NewGame,
    StartGame,
    KickPlayer { player_id: PlayerId },
    MakeAdmin { player_id: PlayerId },
    Leave,
}

impl RoomCommand {
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            RoomCommand::StartGame
                | RoomCommand::NewGame
                | RoomCommand::KickPlayer { .. }
                | RoomCommand::MakeAdmin { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoomCommand::ReplaceCard { .. } => "replace_card",
            RoomCommand::DiscardDrawnCard => "discard_drawn_card",
            RoomCommand::CallStop => "call_stop",
            RoomCommand::PeekDone => "peek_done",
            RoomCommand::NewGame => "new_game",
            RoomCommand::StartGame => "start_game",
            RoomCommand::KickPlayer { .. } => "kick_player",
            RoomCommand::MakeAdmin { .. } => "make_admin",
            RoomCommand::Leave => "leave",
        }
    }
}

/// Single entry point for commands issued by a connected player.
pub fn apply(
    room: &mut Room,
    actor: PlayerId,
    command: RoomCommand,
    policy: NewGamePolicy,
) -> ActionResult {
    if room.player(actor).is_none() {
        return Err(Ignored::UnknownPlayer);
    }
    if command.requires_admin() && !room.is_admin(actor) {
        return Err(Ignored::NotAdmin);
    }

    match command {
        RoomCommand::ReplaceCard { row, index, pile } => {
            replace_card(room, actor, row, index, pile)
        }
        RoomCommand::DiscardDrawnCard => discard_drawn_card(room, actor),
        RoomCommand::CallStop => call_stop(room, actor),
        RoomCommand::PeekDone => peek_done(room, actor),
        RoomCommand::NewGame => new_game(room, policy),
        RoomCommand::StartGame => membership::start_game(room),
        RoomCommand::KickPlayer { player_id } => membership::kick(room, player_id),
        RoomCommand::MakeAdmin { player_id } => membership::set_admin(room, player_id),
        RoomCommand::Leave => membership::leave(room, actor),
    }
}

/// Takes the top card of `pile`. An empty deck, or one emptied by the draw, is
/// rebuilt from the shuffled discard pile.
fn draw(room: &mut Room, pile: Pile) -> Result<Card, Ignored> {
    match pile {
        Pile::Deck => {
            if room.deck.is_empty() {
                refill_deck_from_discard(room);
            }
            if room.deck.is_empty() {
                return Err(Ignored::EmptyPile(Pile::Deck));
            }
            let card = room.deck.remove(0);
            if room.deck.is_empty() {
                refill_deck_from_discard(room);
            }
            Ok(card)
        }
        Pile::Discard => {
            if room.discard.is_empty() {
                return Err(Ignored::EmptyPile(Pile::Discard));
            }
            Ok(room.discard.remove(0))
        }
    }
}

pub(super) fn refill_deck_from_discard(room: &mut Room) {
    let mut recycled = std::mem::take(&mut room.discard);
    shuffle(&mut recycled);
    tracing::debug!(
        room.id = %room.id,
        cards.recycled = recycled.len(),
        "Reshuffling discard pile into deck"
    );
    room.deck.extend(recycled);
}

fn pile_is_empty(room: &Room, pile: Pile) -> bool {
    match pile {
        // The deck can be rebuilt from the discard pile.
        Pile::Deck => room.deck.is_empty() && room.discard.is_empty(),
        Pile::Discard => room.discard.is_empty(),
    }
}

/// Passes the turn to the next seat and closes the round once it gets back to the stopper.
fn end_turn(room: &mut Room, player_id: PlayerId) {
    room.current_turn_player_id = room.next_player_after(player_id);
    finish_round_if_due(room);
}

pub(super) fn finish_round_if_due(room: &mut Room) {
    if room.game_state == GameState::FinalRound
        && room.current_turn_player_id.is_some()
        && room.current_turn_player_id == room.stopper_id
    {
        handle_round_end(room);
    }
}

pub fn replace_card(
    room: &mut Room,
    player_id: PlayerId,
    row: Row,
    index: usize,
    pile: Pile,
) -> ActionResult {
    ensure_turn(room, player_id, ActionKind::ReplaceCard)?;

    let player = room.player(player_id).ok_or(Ignored::UnknownPlayer)?;
    if row == Row::Bottom && !player.can_replace_bottom {
        return Err(Ignored::BottomRowLocked);
    }
    if index >= player.hand.row(row).len() {
        return Err(Ignored::SlotOutOfRange { row, index });
    }
    if pile_is_empty(room, pile) {
        return Err(Ignored::EmptyPile(pile));
    }

    let drawn = draw(room, pile)?;
    let player = room.player_mut(player_id).ok_or(Ignored::UnknownPlayer)?;
    if row == Row::Top {
        player.can_replace_bottom = false;
    }
    let replaced = std::mem::replace(&mut player.hand.row_mut(row)[index], drawn);
    room.discard.insert(0, replaced);

    end_turn(room, player_id);
    Ok(Effect::Updated)
}

pub fn discard_drawn_card(room: &mut Room, player_id: PlayerId) -> ActionResult {
    ensure_turn(room, player_id, ActionKind::DiscardDrawnCard)?;

    let drawn = draw(room, Pile::Deck)?;
    room.discard.insert(0, drawn);

    end_turn(room, player_id);
    Ok(Effect::Updated)
}

pub fn call_stop(room: &mut Room, player_id: PlayerId) -> ActionResult {
    ensure_turn(room, player_id, ActionKind::CallStop)?;

    room.stopper_id = Some(player_id);
    room.game_state = GameState::FinalRound;
    end_turn(room, player_id);
    Ok(Effect::Updated)
}

/// Scores every hand and ends the game.
pub fn handle_round_end(room: &mut Room) {
    room.game_state = GameState::GameOver;
    room.current_turn_player_id = None;
    room.stopper_id = None;
    for player in &mut room.players {
        let score = score_hand(&player.hand);
        player.record_round_score(score);
    }
    tracing::info!(
        room.id = %room.id,
        players = room.players.len(),
        "Round finished and scored"
    );
}

pub fn peek_done(room: &mut Room, player_id: PlayerId) -> ActionResult {
    ensure_admitted(room, ActionKind::PeekDone)?;

    let player = room.player_mut(player_id).ok_or(Ignored::UnknownPlayer)?;
    if player.has_peeked {
        return Err(Ignored::AlreadyPeeked);
    }
    player.has_peeked = true;

    start_play_if_all_peeked(room);
    Ok(Effect::Updated)
}

/// Moves a peeking room into play, turn on the first seat, once every seated
/// player has peeked.
pub(super) fn start_play_if_all_peeked(room: &mut Room) {
    if room.game_state == GameState::Peeking
        && !room.players.is_empty()
        && room.players.iter().all(|p| p.has_peeked)
    {
        room.game_state = GameState::Playing;
        room.current_turn_player_id = room.first_player_id();
    }
}

pub fn new_game(room: &mut Room, policy: NewGamePolicy) -> ActionResult {
    ensure_admitted(room, ActionKind::NewGame)?;

    let mut deck = build_double_deck();
    let mut hands = Vec::with_capacity(room.players.len());
    for _ in &room.players {
        hands.push(Hand::deal_from(&mut deck).ok_or(Ignored::DeckExhausted)?);
    }

    room.deck = deck;
    room.discard.clear();
    for (player, hand) in room.players.iter_mut().zip(hands) {
        player.hand = hand;
        player.has_peeked = false;
        player.can_replace_bottom = true;
    }
    room.stopper_id = None;

    match policy {
        NewGamePolicy::WaitForStart => {
            room.game_state = GameState::WaitingForPlayers;
            room.current_turn_player_id = None;
        }
        NewGamePolicy::DealAndPeek => {
            room.game_state = GameState::Peeking;
            room.current_turn_player_id = room.first_player_id();
        }
    }
    Ok(Effect::Updated)
}
