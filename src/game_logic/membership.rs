//! Seats, presence and admin ownership.

use super::cards::{CARDS_PER_PLAYER, Hand};
use super::engine::{self, ActionKind, MIN_PLAYERS_TO_START};
use super::room::{GameState, Player, PlayerId, Room};
use super::{ActionResult, Effect, Ignored};

/// Seats a new player at the end of the table with a freshly dealt hand.
/// The first player to sit down becomes admin and holds the turn.
pub fn join(room: &mut Room, player_id: PlayerId, name: String, picture: String) -> ActionResult {
    if room.player(player_id).is_some() {
        return Err(Ignored::AlreadySeated);
    }
    if room.is_full() {
        return Err(Ignored::RoomFull);
    }
    if room.deck.len() < CARDS_PER_PLAYER {
        if room.deck.len() + room.discard.len() < CARDS_PER_PLAYER {
            return Err(Ignored::DeckExhausted);
        }
        engine::refill_deck_from_discard(room);
    }
    let hand = Hand::deal_from(&mut room.deck).ok_or(Ignored::DeckExhausted)?;

    if room.players.is_empty() {
        room.admin_id = Some(player_id);
        room.current_turn_player_id = Some(player_id);
    }
    room.players.push(Player::new(player_id, name, picture, hand));

    tracing::info!(
        room.id = %room.id,
        player.id = %player_id,
        players = room.players.len(),
        "Player joined room"
    );
    Ok(Effect::Updated)
}

/// Removes a player and returns their cards to the bottom of the deck.
pub fn leave(room: &mut Room, player_id: PlayerId) -> ActionResult {
    let seat = room.seat_of(player_id).ok_or(Ignored::UnknownPlayer)?;
    let player = room.players.remove(seat);
    room.deck.extend(player.hand.into_cards());

    tracing::info!(
        room.id = %room.id,
        player.id = %player_id,
        players = room.players.len(),
        "Player left room"
    );

    if room.players.is_empty() {
        return Ok(Effect::Closed);
    }

    if room.stopper_id == Some(player_id) {
        // The seat after the stopper now marks where the final round ends. If
        // that seat is playing right now, the round ends when the turn comes
        // back around to it.
        room.stopper_id = Some(room.players[seat % room.players.len()].id);
    }
    let held_turn = room.current_turn_player_id == Some(player_id);
    if held_turn {
        room.current_turn_player_id = room.first_player_id();
    }
    if room.admin_id == Some(player_id) {
        room.admin_id = room.first_active_player_id();
        if room.admin_id.is_none() {
            return Ok(Effect::Closed);
        }
    }

    if held_turn {
        engine::finish_round_if_due(room);
    }
    engine::start_play_if_all_peeked(room);
    Ok(Effect::Updated)
}

/// Removal ordered by the admin. Same card return and reassignment as [`leave`].
pub fn kick(room: &mut Room, player_id: PlayerId) -> ActionResult {
    leave(room, player_id)
}

/// Marks a seated player as connected or disconnected without touching their seat or cards.
pub fn set_active(room: &mut Room, player_id: PlayerId, is_active: bool) -> ActionResult {
    let player = room.player_mut(player_id).ok_or(Ignored::UnknownPlayer)?;
    if player.is_active == is_active {
        return Err(Ignored::Unchanged);
    }
    player.is_active = is_active;

    if !is_active && room.admin_id == Some(player_id) {
        room.admin_id = room.first_active_player_id();
    }
    if room.admin_id.is_none() {
        return Ok(Effect::Closed);
    }
    Ok(Effect::Updated)
}

pub fn set_admin(room: &mut Room, player_id: PlayerId) -> ActionResult {
    let player = room.player(player_id).ok_or(Ignored::UnknownPlayer)?;
    if !player.is_active {
        return Err(Ignored::InactivePlayer);
    }
    if room.admin_id == Some(player_id) {
        return Err(Ignored::Unchanged);
    }
    room.admin_id = Some(player_id);
    Ok(Effect::Updated)
}

pub fn start_game(room: &mut Room) -> ActionResult {
    engine::ensure_admitted(room, ActionKind::StartGame)?;
    if room.players.len() < MIN_PLAYERS_TO_START {
        return Err(Ignored::NotEnoughPlayers(MIN_PLAYERS_TO_START));
    }
    room.game_state = GameState::Peeking;
    room.current_turn_player_id = room.first_player_id();
    Ok(Effect::Updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::cards::{DOUBLE_DECK_SIZE, Pile, Row};
    use uuid::Uuid;

    fn seat(room: &mut Room, count: usize) -> Vec<PlayerId> {
        (0..count)
            .map(|i| {
                let id = Uuid::new_v4();
                join(room, id, format!("p{i}"), format!("avatar{i}.png")).unwrap();
                id
            })
            .collect()
    }

    #[test]
    fn test_first_joiner_becomes_admin_and_holds_turn() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 2);

        assert_eq!(room.admin_id, Some(ids[0]));
        assert_eq!(room.current_turn_player_id, Some(ids[0]));
        let newcomer = &room.players[1];
        assert!(newcomer.can_replace_bottom);
        assert!(!newcomer.has_peeked);
        assert!(newcomer.is_active);
        assert!(newcomer.scores_by_round.is_empty());
        assert_eq!(newcomer.total_score, 0);
        assert_eq!(room.deck.len(), DOUBLE_DECK_SIZE - 12);
    }

    #[test]
    fn test_join_full_room_is_ignored() {
        let mut room = Room::new("r".to_string(), 2);
        seat(&mut room, 2);
        let before = room.clone();

        let result = join(&mut room, Uuid::new_v4(), "late".to_string(), String::new());
        assert_eq!(result, Err(Ignored::RoomFull));
        assert_eq!(room, before);
    }

    #[test]
    fn test_join_twice_is_ignored() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 1);
        assert_eq!(
            join(&mut room, ids[0], "again".to_string(), String::new()),
            Err(Ignored::AlreadySeated)
        );
    }

    #[test]
    fn test_join_with_short_deck_folds_discard_in() {
        let mut room = Room::new("r".to_string(), 4);
        seat(&mut room, 1);
        let spill = room.deck.len() - 2;
        let moved: Vec<_> = room.deck.drain(..spill).collect();
        room.discard = moved;

        seat(&mut room, 1);
        assert_eq!(room.total_cards(), DOUBLE_DECK_SIZE);
        assert!(room.discard.is_empty());
    }

    #[test]
    fn test_leave_returns_cards_to_tail_of_deck() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 3);
        let deck_len = room.deck.len();
        let leaving_cards: Vec<_> = room.players[1].hand.cards().copied().collect();

        assert_eq!(leave(&mut room, ids[1]), Ok(Effect::Updated));
        assert_eq!(room.deck.len(), deck_len + 6);
        assert_eq!(room.deck[deck_len..], leaving_cards[..]);
        assert_eq!(room.total_cards(), DOUBLE_DECK_SIZE);
    }

    #[test]
    fn test_leave_moves_turn_and_admin_to_first_player() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 3);
        room.current_turn_player_id = Some(ids[0]);

        leave(&mut room, ids[0]).unwrap();
        assert_eq!(room.admin_id, Some(ids[1]));
        assert_eq!(room.current_turn_player_id, Some(ids[1]));
    }

    #[test]
    fn test_last_player_leaving_closes_room() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 1);
        assert_eq!(leave(&mut room, ids[0]), Ok(Effect::Closed));
    }

    #[test]
    fn test_leave_unknown_player_is_ignored() {
        let mut room = Room::new("r".to_string(), 4);
        seat(&mut room, 2);
        assert_eq!(leave(&mut room, Uuid::new_v4()), Err(Ignored::UnknownPlayer));
    }

    #[test]
    fn test_kick_behaves_like_leave() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 2);
        let deck_len = room.deck.len();
        kick(&mut room, ids[1]).unwrap();
        assert_eq!(room.players.len(), 1);
        assert_eq!(room.deck.len(), deck_len + 6);
    }

    #[test]
    fn test_stopper_leaving_keeps_final_round_bounded() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 4);
        start_game(&mut room).unwrap();
        for id in &ids {
            engine::peek_done(&mut room, *id).unwrap();
        }
        engine::call_stop(&mut room, ids[0]).unwrap();
        engine::discard_drawn_card(&mut room, ids[1]).unwrap();
        assert_eq!(room.current_turn_player_id, Some(ids[2]));

        leave(&mut room, ids[0]).unwrap();
        assert_eq!(room.stopper_id, Some(ids[1]));
        assert_eq!(room.game_state, GameState::FinalRound);

        engine::replace_card(&mut room, ids[2], Row::Top, 0, Pile::Deck).unwrap();
        assert_eq!(room.game_state, GameState::FinalRound);
        engine::discard_drawn_card(&mut room, ids[3]).unwrap();
        assert_eq!(room.game_state, GameState::GameOver);
    }

    #[test]
    fn test_stopper_leaving_before_anyone_plays_keeps_final_turns() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 3);
        start_game(&mut room).unwrap();
        for id in &ids {
            engine::peek_done(&mut room, *id).unwrap();
        }
        engine::call_stop(&mut room, ids[0]).unwrap();
        assert_eq!(room.current_turn_player_id, Some(ids[1]));

        leave(&mut room, ids[0]).unwrap();
        assert_eq!(room.game_state, GameState::FinalRound);
        assert_eq!(room.current_turn_player_id, Some(ids[1]));
        assert!(room.players.iter().all(|p| p.scores_by_round.is_empty()));

        engine::discard_drawn_card(&mut room, ids[1]).unwrap();
        assert_eq!(room.game_state, GameState::FinalRound);
        engine::discard_drawn_card(&mut room, ids[2]).unwrap();
        assert_eq!(room.game_state, GameState::GameOver);
        for player in &room.players {
            assert_eq!(player.scores_by_round.len(), 1);
        }
    }

    #[test]
    fn test_last_unpeeked_player_leaving_starts_play() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 3);
        start_game(&mut room).unwrap();
        engine::peek_done(&mut room, ids[0]).unwrap();
        engine::peek_done(&mut room, ids[1]).unwrap();
        assert_eq!(room.game_state, GameState::Peeking);

        leave(&mut room, ids[2]).unwrap();
        assert_eq!(room.game_state, GameState::Playing);
        assert_eq!(room.current_turn_player_id, Some(ids[0]));
        engine::discard_drawn_card(&mut room, ids[0]).unwrap();
        assert_eq!(room.current_turn_player_id, Some(ids[1]));
    }

    #[test]
    fn test_leave_during_peeking_waits_for_remaining_peeks() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 3);
        start_game(&mut room).unwrap();
        engine::peek_done(&mut room, ids[0]).unwrap();

        kick(&mut room, ids[2]).unwrap();
        assert_eq!(room.game_state, GameState::Peeking);
        engine::peek_done(&mut room, ids[1]).unwrap();
        assert_eq!(room.game_state, GameState::Playing);
    }

    #[test]
    fn test_deactivating_admin_hands_admin_to_active_player() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 3);
        set_active(&mut room, ids[1], false).unwrap();

        assert_eq!(set_active(&mut room, ids[0], false), Ok(Effect::Updated));
        assert_eq!(room.admin_id, Some(ids[2]));
        assert_eq!(room.players.len(), 3);
    }

    #[test]
    fn test_no_active_players_closes_room() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 2);
        set_active(&mut room, ids[1], false).unwrap();
        assert_eq!(set_active(&mut room, ids[0], false), Ok(Effect::Closed));
    }

    #[test]
    fn test_reactivation_keeps_seat_and_hand() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 2);
        let hand = room.players[1].hand.clone();

        set_active(&mut room, ids[1], false).unwrap();
        set_active(&mut room, ids[1], true).unwrap();
        assert_eq!(room.players[1].hand, hand);
        assert!(room.players[1].is_active);
        assert_eq!(set_active(&mut room, ids[1], true), Err(Ignored::Unchanged));
    }

    #[test]
    fn test_set_admin_requires_active_target() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 3);
        set_active(&mut room, ids[2], false).unwrap();

        assert_eq!(set_admin(&mut room, ids[2]), Err(Ignored::InactivePlayer));
        assert_eq!(room.admin_id, Some(ids[0]));
        assert_eq!(set_admin(&mut room, ids[1]), Ok(Effect::Updated));
        assert_eq!(room.admin_id, Some(ids[1]));
    }

    #[test]
    fn test_start_game_rules() {
        let mut room = Room::new("r".to_string(), 4);
        let ids = seat(&mut room, 1);
        assert_eq!(
            start_game(&mut room),
            Err(Ignored::NotEnoughPlayers(MIN_PLAYERS_TO_START))
        );

        seat(&mut room, 1);
        assert_eq!(start_game(&mut room), Ok(Effect::Updated));
        assert_eq!(room.game_state, GameState::Peeking);
        assert_eq!(room.current_turn_player_id, Some(ids[0]));

        assert!(matches!(
            start_game(&mut room),
            Err(Ignored::WrongPhase { .. })
        ));
    }
}
