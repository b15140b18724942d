use thiserror::Error;

pub mod cards;
pub mod engine;
pub mod membership;
pub mod messages;
pub mod room;

pub use cards::{Card, Hand, Pile, Row};
pub use engine::{ActionKind, NewGamePolicy, RoomCommand};
pub use messages::{ClientToServerMessage, ServerToClientMessage};
pub use room::{GameState, Player, PlayerId, Room};

/// What a legal action did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The room was mutated and should be persisted and broadcast.
    Updated,
    /// The room has no active players left and should be deleted.
    Closed,
}

/// Why an action left the room untouched. These are expected under stale or
/// duplicated client messages and are never surfaced as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ignored {
    #[error("{action:?} is not allowed while the room is {state:?}")]
    WrongPhase { action: ActionKind, state: GameState },
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("player is not seated in this room")]
    UnknownPlayer,
    #[error("player is already seated in this room")]
    AlreadySeated,
    #[error("the {0:?} pile is empty")]
    EmptyPile(Pile),
    #[error("the bottom row is locked after a top card was replaced")]
    BottomRowLocked,
    #[error("there is no card at {row:?} slot {index}")]
    SlotOutOfRange { row: Row, index: usize },
    #[error("the room is full")]
    RoomFull,
    #[error("only the room admin can do that")]
    NotAdmin,
    #[error("player is not active")]
    InactivePlayer,
    #[error("at least {0} players are needed")]
    NotEnoughPlayers(usize),
    #[error("player has already peeked")]
    AlreadyPeeked,
    #[error("not enough cards left to deal a hand")]
    DeckExhausted,
    #[error("nothing to change")]
    Unchanged,
}

pub type ActionResult = Result<Effect, Ignored>;
