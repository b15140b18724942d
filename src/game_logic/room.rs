use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cards::{Card, Hand, build_double_deck};

pub type PlayerId = Uuid;

pub const MIN_ROOM_CAPACITY: usize = 2;
/// Largest table a single double deck can seat.
pub const MAX_ROOM_CAPACITY: usize = 17;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    WaitingForPlayers,
    Peeking,
    Playing,
    FinalRound,
    GameOver,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub picture: String,
    pub hand: Hand,
    pub scores_by_round: Vec<u32>,
    pub total_score: u32,
    pub can_replace_bottom: bool,
    pub has_peeked: bool,
    pub is_active: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String, picture: String, hand: Hand) -> Self {
        Self {
            id,
            name,
            picture,
            hand,
            scores_by_round: Vec::new(),
            total_score: 0,
            can_replace_bottom: true,
            has_peeked: false,
            is_active: true,
        }
    }

    pub fn record_round_score(&mut self, score: u32) {
        self.scores_by_round.push(score);
        self.total_score += score;
    }
}

/// The whole authoritative document for one room. It is always persisted as a
/// unit; `version` is bumped by the store on every successful replace.
///
/// Pile ordering: index 0 is the top of both `deck` (next draw) and `discard`
/// (most recently discarded).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Room {
    pub id: String,
    pub players: Vec<Player>,
    pub game_state: GameState,
    pub max_capacity: usize,
    pub deck: Vec<Card>,
    pub discard: Vec<Card>,
    pub current_turn_player_id: Option<PlayerId>,
    pub stopper_id: Option<PlayerId>,
    pub admin_id: Option<PlayerId>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: String, max_capacity: usize) -> Self {
        Self {
            id,
            players: Vec::new(),
            game_state: GameState::WaitingForPlayers,
            max_capacity,
            deck: build_double_deck(),
            discard: Vec::new(),
            current_turn_player_id: None,
            stopper_id: None,
            admin_id: None,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_capacity
    }

    pub fn seat_of(&self, player_id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    /// The player seated after `player_id`, wrapping around the table.
    pub fn next_player_after(&self, player_id: PlayerId) -> Option<PlayerId> {
        let seat = self.seat_of(player_id)?;
        let next = (seat + 1) % self.players.len();
        Some(self.players[next].id)
    }

    pub fn first_player_id(&self) -> Option<PlayerId> {
        self.players.first().map(|p| p.id)
    }

    pub fn first_active_player_id(&self) -> Option<PlayerId> {
        self.players.iter().find(|p| p.is_active).map(|p| p.id)
    }

    pub fn is_turn_of(&self, player_id: PlayerId) -> bool {
        self.current_turn_player_id == Some(player_id)
    }

    pub fn is_admin(&self, player_id: PlayerId) -> bool {
        self.admin_id == Some(player_id)
    }

    /// Cards in the deck, the discard pile and every hand.
    pub fn total_cards(&self) -> usize {
        self.deck.len() + self.discard.len() + self.players.iter().map(|p| p.hand.len()).sum::<usize>()
    }
}
