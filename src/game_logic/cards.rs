use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PLAYER_HAND_SIZE: usize = 3;
pub const CARDS_PER_PLAYER: usize = PLAYER_HAND_SIZE * 2;
pub const DOUBLE_DECK_SIZE: usize = 104;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rank {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "jack")]
    Jack,
    #[serde(rename = "queen")]
    Queen,
    #[serde(rename = "king")]
    King,
    #[serde(rename = "ace")]
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// Points a single unmatched card of this rank adds to a round score.
    pub fn value(self) -> u32 {
        match self {
            Rank::King => 0,
            Rank::Ace => 1,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack | Rank::Queen => 10,
        }
    }
}

/// Cards carry no identity beyond suit and rank; the double deck holds every pair twice.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    pub fn new(suit: Suit, rank: Rank) -> Self {
        Self { suit, rank }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Row {
    Top,
    Bottom,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Pile {
    Deck,
    Discard,
}

/// Two fixed-length rows. Replacement swaps in place so row lengths never change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Hand {
    pub top: Vec<Card>,
    pub bottom: Vec<Card>,
}

impl Hand {
    /// Deals `top` first and then `bottom` from the front of `deck`.
    /// Returns `None`, leaving the deck untouched, when fewer than six cards remain.
    pub fn deal_from(deck: &mut Vec<Card>) -> Option<Self> {
        if deck.len() < CARDS_PER_PLAYER {
            return None;
        }
        let top = deck.drain(..PLAYER_HAND_SIZE).collect();
        let bottom = deck.drain(..PLAYER_HAND_SIZE).collect();
        Some(Self { top, bottom })
    }

    pub fn row(&self, row: Row) -> &[Card] {
        match row {
            Row::Top => &self.top,
            Row::Bottom => &self.bottom,
        }
    }

    pub fn row_mut(&mut self, row: Row) -> &mut Vec<Card> {
        match row {
            Row::Top => &mut self.top,
            Row::Bottom => &mut self.bottom,
        }
    }

    pub fn len(&self) -> usize {
        self.top.len() + self.bottom.len()
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.top.iter().chain(self.bottom.iter())
    }

    pub fn into_cards(self) -> impl Iterator<Item = Card> {
        self.top.into_iter().chain(self.bottom)
    }
}

pub fn shuffle(cards: &mut [Card]) {
    cards.shuffle(&mut thread_rng());
}

/// Two standard 52-card sets, shuffled together.
pub fn build_double_deck() -> Vec<Card> {
    let mut deck: Vec<Card> = (0..2)
        .flat_map(|_| {
            Suit::ALL
                .iter()
                .flat_map(|&suit| Rank::ALL.iter().map(move |&rank| Card::new(suit, rank)))
        })
        .collect();
    shuffle(&mut deck);
    deck
}

pub fn card_value(rank: Rank) -> u32 {
    rank.value()
}

/// Round score of a hand; lower is better. Ranks held two or more times cancel out.
pub fn score_hand(hand: &Hand) -> u32 {
    let mut rank_counts: HashMap<Rank, usize> = HashMap::new();
    for card in hand.cards() {
        *rank_counts.entry(card.rank).or_default() += 1;
    }

    rank_counts
        .into_iter()
        .filter(|&(_, count)| count == 1)
        .map(|(rank, _)| card_value(rank))
        .sum()
}
